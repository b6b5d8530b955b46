use futures::StreamExt;
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use warden_core::paths::notify_path;
use warden_core::{AccountId, AssignmentStore, ChangeNotifier, ChannelId};
use warden_metadata_store::{MetadataError, MetadataStore, WatchEvent, WatchStream};

use crate::filter::{AllowedChannels, ChannelFilter};
use crate::listener_metrics::{
    LISTENER_ALLOWED_CHANNELS, LISTENER_APPLIED_VERSION, LISTENER_RELOADS_TOTAL,
    LISTENER_RELOAD_FAILURES_TOTAL,
};
use crate::ListenerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListenerState {
    Disconnected,
    Subscribing,
    Synced,
    Applying,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Period of the reconciliation read that runs whether or not a signal arrived
    pub fallback_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

// floor for every retry delay and for the fallback period
const MIN_INTERVAL: Duration = Duration::from_millis(10);

impl ListenerConfig {
    /// Clamps zero or inverted durations so a failing store is never re-read in a tight loop.
    fn normalized(self) -> Self {
        let initial_backoff = self.initial_backoff.max(MIN_INTERVAL);
        ListenerConfig {
            fallback_interval: self.fallback_interval.max(MIN_INTERVAL),
            initial_backoff,
            max_backoff: self.max_backoff.max(initial_backoff),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            fallback_interval: Duration::from_secs(60),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Keeps one account's allowed channel set in sync with the assignment store.
///
/// ## State machine:
/// `Disconnected -> Subscribing -> Synced <-> Applying`
///
/// ## Process Flow:
/// 1. **Subscribe** to `/warden/notify/{account_id}`
/// 2. **Initial read** of the assignment, whether or not a signal has arrived yet
/// 3. **Reload** on every reload signal and on every fallback tick
///
/// Reloads run one at a time inside [`AccountListener::run`] and only apply a
/// version strictly greater than the one already applied. A failed read keeps the
/// previous set and is retried with exponential backoff. Notifications are only an
/// accelerator: the fallback read alone converges to the latest assignment.
pub struct AccountListener {
    account_id: AccountId,
    store: AssignmentStore,
    notifier: ChangeNotifier,
    config: ListenerConfig,
    allowed_tx: watch::Sender<Arc<AllowedChannels>>,
    state_tx: watch::Sender<ListenerState>,
    subscribed: bool,
}

impl std::fmt::Debug for AccountListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountListener")
            .field("account_id", &self.account_id)
            .field("state", &*self.state_tx.borrow())
            .field("subscribed", &self.subscribed)
            .finish()
    }
}

async fn next_event(stream: &mut Option<WatchStream>) -> Option<Result<WatchEvent, MetadataError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl AccountListener {
    pub fn new(
        account_id: AccountId,
        meta_store: Arc<dyn MetadataStore>,
        config: ListenerConfig,
    ) -> Self {
        let (allowed_tx, _) = watch::channel(Arc::new(AllowedChannels::default()));
        let (state_tx, _) = watch::channel(ListenerState::Disconnected);

        AccountListener {
            account_id,
            store: AssignmentStore::new(meta_store.clone()),
            notifier: ChangeNotifier::new(meta_store),
            config: config.normalized(),
            allowed_tx,
            state_tx,
            subscribed: false,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Handle for the protocol side; valid for as long as the listener runs.
    pub fn filter(&self) -> ChannelFilter {
        ChannelFilter::new(self.allowed_tx.subscribe())
    }

    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    /// Runs the listener until `shutdown` flips to true or its sender is dropped.
    ///
    /// Returns [`ListenerError::Stopped`] if it was stopped before the first
    /// successful read.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ListenerError> {
        let notify_key = notify_path(&self.account_id);

        self.set_state(ListenerState::Subscribing);
        let mut notifications = self.subscribe().await;

        let mut backoff = self.config.initial_backoff;
        while let Err(e) = self.reload("initial").await {
            warn!(
                account_id = %self.account_id,
                error = %e,
                retry_in_ms = backoff.as_millis() as u64,
                "initial assignment read failed"
            );
            tokio::select! {
                _ = sleep(backoff) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.set_state(ListenerState::Disconnected);
                        return Err(ListenerError::Stopped);
                    }
                }
            }
            backoff = self.next_backoff(backoff);
        }

        backoff = self.config.initial_backoff;
        let mut next_poll = Instant::now() + self.config.fallback_interval;

        loop {
            let outcome = tokio::select! {
                event = next_event(&mut notifications) => match event {
                    // the watch is prefix based, acc1 would also see acc10
                    Some(Ok(event)) if event.key() == notify_key.as_bytes() => {
                        Some(self.reload("notification").await)
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!(account_id = %self.account_id, error = %e, "notification stream error, resyncing");
                        Some(self.reload("resync").await)
                    }
                    None => {
                        notifications = None;
                        self.subscribed = false;
                        self.log_state("notification stream closed, relying on fallback reads");
                        None
                    }
                },
                _ = sleep_until(next_poll) => {
                    if notifications.is_none() {
                        notifications = self.subscribe().await;
                    }
                    Some(self.reload("fallback").await)
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    None
                }
            };

            match outcome {
                Some(Ok(_)) => {
                    backoff = self.config.initial_backoff;
                    next_poll = Instant::now() + self.config.fallback_interval;
                }
                Some(Err(e)) => {
                    warn!(
                        account_id = %self.account_id,
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "assignment reload failed, keeping the current channel set"
                    );
                    next_poll = Instant::now() + backoff;
                    backoff = self.next_backoff(backoff);
                }
                None => {}
            }
        }

        self.subscribed = false;
        self.set_state(ListenerState::Disconnected);
        self.log_state("listener stopped");
        Ok(())
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).clamp(MIN_INTERVAL, self.config.max_backoff)
    }

    async fn subscribe(&mut self) -> Option<WatchStream> {
        match self.notifier.subscribe(&self.account_id).await {
            Ok(stream) => {
                self.subscribed = true;
                self.log_state("subscribed to reload signals");
                Some(stream)
            }
            Err(e) => {
                self.subscribed = false;
                warn!(
                    account_id = %self.account_id,
                    error = %e,
                    "unable to subscribe to reload signals, relying on fallback reads"
                );
                None
            }
        }
    }

    /// Reads the store and applies the result if it is newer. Returns whether a
    /// new set was swapped in.
    async fn reload(&mut self, trigger: &'static str) -> Result<bool, ListenerError> {
        self.set_state(ListenerState::Applying);
        counter!(LISTENER_RELOADS_TOTAL.name, "account" => self.account_id.to_string(), "trigger" => trigger)
            .increment(1);

        let result = match self.store.read(&self.account_id).await {
            Ok((version, channels)) => Ok(self.apply(version, channels)),
            Err(e) => {
                counter!(LISTENER_RELOAD_FAILURES_TOTAL.name, "account" => self.account_id.to_string())
                    .increment(1);
                Err(ListenerError::from(e))
            }
        };

        if self.allowed_tx.borrow().version.is_some() {
            self.set_state(ListenerState::Synced);
        } else {
            self.set_state(ListenerState::Subscribing);
        }
        result
    }

    fn apply(&mut self, version: u64, channels: BTreeSet<ChannelId>) -> bool {
        let applied = self.allowed_tx.borrow().version;
        if let Some(applied) = applied {
            if version <= applied {
                debug!(
                    account_id = %self.account_id,
                    version,
                    applied,
                    "assignment version already applied"
                );
                return false;
            }
        }

        let allowed_count = channels.len();
        self.allowed_tx.send_replace(Arc::new(AllowedChannels {
            version: Some(version),
            channels,
        }));

        gauge!(LISTENER_ALLOWED_CHANNELS.name, "account" => self.account_id.to_string())
            .set(allowed_count as f64);
        gauge!(LISTENER_APPLIED_VERSION.name, "account" => self.account_id.to_string())
            .set(version as f64);
        self.log_state("assignment applied");
        true
    }

    fn set_state(&self, next: ListenerState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(account_id = %self.account_id, from = ?*state, to = ?next, "listener state");
            *state = next;
            true
        });
    }

    fn log_state(&self, message: &str) {
        let allowed = self.allowed_tx.borrow().clone();
        info!(
            account_id = %self.account_id,
            subscribed = self.subscribed,
            allowed_count = allowed.channels.len(),
            last_applied_version = ?allowed.version,
            "{}",
            message
        );
    }
}
