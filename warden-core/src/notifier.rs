use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};
use warden_metadata_store::{MetaOptions, MetadataStore, WatchStream};

use crate::paths::notify_path;
use crate::{AccountId, Result};

/// Payload published on an account's notification topic. It never carries the
/// assignment itself; listeners always re-read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "lowercase")]
pub enum ReloadSignal {
    Reload,
}

/// Fire-and-forget "reload now" fan-out to per-account notification topics.
#[derive(Clone)]
pub struct ChangeNotifier {
    meta_store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier").finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    pub fn new(meta_store: Arc<dyn MetadataStore>) -> Self {
        ChangeNotifier { meta_store }
    }

    /// Publishes a reload signal for `account_id`.
    ///
    /// Best effort: a failure is logged and reported as `false`, never retried.
    /// Listeners recover through their periodic fallback read.
    pub async fn notify(&self, account_id: &AccountId) -> bool {
        let path = notify_path(account_id);
        let payload = match serde_json::to_value(ReloadSignal::Reload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "failed to encode reload signal");
                return false;
            }
        };

        match self.meta_store.put(&path, payload, MetaOptions::None).await {
            Ok(()) => {
                trace!(account_id = %account_id, "reload signal published");
                true
            }
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "failed to publish reload signal");
                false
            }
        }
    }

    /// Notifies every account concurrently, returns how many signals were published.
    pub async fn notify_all<'a>(&self, accounts: impl IntoIterator<Item = &'a AccountId>) -> usize {
        join_all(accounts.into_iter().map(|account_id| self.notify(account_id)))
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    /// Watches the notification topic of `account_id`.
    ///
    /// The watch is prefix based, so callers must match the event key exactly
    /// (`acc1` would otherwise also see `acc10`).
    pub async fn subscribe(&self, account_id: &AccountId) -> Result<WatchStream> {
        Ok(self.meta_store.watch(&notify_path(account_id)).await?)
    }
}
