use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, warn};
use warden_core::paths::load_report_path;
use warden_core::AccountId;
use warden_load_manager::{generate_load_report, LoadReport};
use warden_metadata_store::{MetaOptions, MetadataStore};

use crate::filter::ChannelFilter;
use crate::sink::GateCounters;

/// Periodically posts the account's throughput to `/warden/accounts/load/{account_id}`.
pub struct LoadReporter {
    account_id: AccountId,
    meta_store: Arc<dyn MetadataStore>,
    counters: Arc<GateCounters>,
    filter: ChannelFilter,
    interval: Duration,
}

impl LoadReporter {
    pub fn new(
        account_id: AccountId,
        meta_store: Arc<dyn MetadataStore>,
        counters: Arc<GateCounters>,
        filter: ChannelFilter,
        interval: Duration,
    ) -> Self {
        LoadReporter {
            account_id,
            meta_store,
            counters,
            filter,
            interval,
        }
    }

    /// Builds and posts one report covering `elapsed`.
    pub async fn post_once(&self, elapsed: Duration) -> Option<LoadReport> {
        let report = generate_load_report(
            self.account_id.clone(),
            self.counters.take_forwarded(),
            elapsed,
            self.filter.allowed_count(),
        );

        let value = match serde_json::to_value(&report) {
            Ok(value) => value,
            Err(e) => {
                warn!(account_id = %self.account_id, error = %e, "unable to encode load report");
                return None;
            }
        };

        let path = load_report_path(&self.account_id);
        match self.meta_store.put(&path, value, MetaOptions::None).await {
            Ok(()) => {
                debug!(
                    account_id = %self.account_id,
                    events_per_minute = report.events_per_minute,
                    "posted a new load report"
                );
                Some(report)
            }
            Err(e) => {
                debug!(account_id = %self.account_id, error = %e, "unable to post load report");
                None
            }
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        // the first tick completes immediately
        interval.tick().await;
        let mut last = time::Instant::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = time::Instant::now();
                    self.post_once(now - last).await;
                    last = now;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
