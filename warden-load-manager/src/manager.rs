use crate::load_report::LoadReport;
use crate::weights::{WeightParams, WeightSnapshot, WeightTracker};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use warden_core::paths::{account_from_load_path, BASE_ACCOUNT_LOAD_PATH};
use warden_core::AccountId;
use warden_metadata_store::{MetadataStore, WatchEvent, WatchStream};

/// LoadManager - per-account load tracking for the coordinator
///
/// ## Core Responsibilities:
/// - **Bootstrap**: loads the load reports already present in the metadata store
/// - **Watch**: follows new reports under `/warden/accounts/load/` and folds them into
///   the [`WeightTracker`]
/// - **Snapshot**: hands the balancer a frozen [`WeightSnapshot`] at the start of each rebalance
///
/// A report is only folded in once: reports whose `sampled_at` is not newer than the
/// last one seen for that account are ignored, so a report seen both by the bootstrap
/// read and by the watch is not counted twice.
#[derive(Clone)]
pub struct LoadManager {
    tracker: Arc<Mutex<WeightTracker>>,
    last_sampled: Arc<Mutex<HashMap<AccountId, DateTime<Utc>>>>,
    meta_store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for LoadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadManager").finish_non_exhaustive()
    }
}

fn load_prefix() -> String {
    format!("{}/", BASE_ACCOUNT_LOAD_PATH)
}

impl LoadManager {
    pub fn new(meta_store: Arc<dyn MetadataStore>, params: WeightParams) -> Self {
        LoadManager {
            tracker: Arc::new(Mutex::new(WeightTracker::new(params))),
            last_sampled: Arc::new(Mutex::new(HashMap::new())),
            meta_store,
        }
    }

    /// Loads the existing reports and opens the watch on the load prefix.
    ///
    /// The watch is opened first so that a report posted while the initial reports
    /// are read is not lost.
    pub async fn bootstrap(&self) -> Result<WatchStream> {
        let watch_stream = self.meta_store.watch(&load_prefix()).await?;
        self.fetch_initial_load().await?;
        Ok(watch_stream)
    }

    async fn fetch_initial_load(&self) -> Result<()> {
        let entries = self.meta_store.get_bulk(&load_prefix()).await?;

        let mut loaded = 0;
        for entry in entries {
            match self.handle_load_update(entry.key.as_bytes(), &entry.value).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(key = %entry.key, error = %e, "skipping unreadable load report"),
            }
        }
        info!(reports = loaded, "load manager bootstrapped from stored load reports");
        Ok(())
    }

    /// Processes load report events until the stream ends or `shutdown` flips to true.
    pub async fn start(&self, mut watch_stream: WatchStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                next = watch_stream.next() => {
                    let Some(result) = next else {
                        warn!("load report watch stream ended");
                        break;
                    };
                    match result {
                        Ok(WatchEvent::Put { key, value, .. }) => {
                            if let Err(e) = self.handle_load_update(&key, &value).await {
                                error!(error = %e, "error handling load update");
                            }
                        }
                        Ok(WatchEvent::Delete { key, .. }) => {
                            self.handle_load_removal(&key).await;
                        }
                        Err(e) => {
                            error!(error = %e, "error receiving watch event");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("load manager stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_load_update(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_str =
            std::str::from_utf8(key).map_err(|e| anyhow!("Invalid UTF-8 in key: {}", e))?;
        let account_id = account_from_load_path(key_str)
            .ok_or_else(|| anyhow!("unexpected load report key {}", key_str))?;

        let report: LoadReport = serde_json::from_slice(value)?;
        if report.account_id != account_id {
            return Err(anyhow!(
                "load report for {} stored under the key of {}",
                report.account_id,
                account_id
            ));
        }

        self.record(report).await;
        Ok(())
    }

    async fn handle_load_removal(&self, key: &[u8]) {
        let Some(account_id) = std::str::from_utf8(key).ok().and_then(account_from_load_path)
        else {
            return;
        };
        self.last_sampled.lock().await.remove(&account_id);
        self.tracker.lock().await.forget(&account_id);
        info!(account_id = %account_id, "load report removed, weight reset to the floor");
    }

    /// Folds one report into the tracker, returns false for stale or duplicate reports.
    pub async fn record(&self, report: LoadReport) -> bool {
        {
            let mut last_sampled = self.last_sampled.lock().await;
            if let Some(previous) = last_sampled.get(&report.account_id) {
                if report.sampled_at <= *previous {
                    return false;
                }
            }
            last_sampled.insert(report.account_id.clone(), report.sampled_at);
        }

        let weight = self
            .tracker
            .lock()
            .await
            .observe(&report.account_id, report.events_per_minute);

        debug!(
            account_id = %report.account_id,
            events_per_minute = report.events_per_minute,
            weight,
            "account weight updated"
        );
        true
    }

    pub async fn current_weight(&self, account_id: &AccountId) -> f64 {
        self.tracker.lock().await.current_weight(account_id)
    }

    pub async fn weights(&self) -> WeightSnapshot {
        self.tracker.lock().await.snapshot()
    }
}
