use crate::coordinator_metrics::{
    ACCOUNTS_NOTIFIED, ACCOUNT_CHANNELS, ASSIGNMENT_COVERAGE, ASSIGNMENT_IMBALANCE,
    ASSIGNMENT_VERSION, NOTIFICATION_FAILURES_TOTAL, REBALANCE_DURATION_SECONDS,
    REBALANCE_FAILURES_TOTAL, REBALANCE_TOTAL,
};
use crate::membership::MembershipSource;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use warden_core::paths::history_path;
use warden_core::{
    AccountId, AssignmentDiff, AssignmentStore, ChangeNotifier, ChannelId, Mapping,
    RedistributionSummary,
};
use warden_load_manager::{balance, LoadManager};
use warden_metadata_store::{MetaOptions, MetadataStore};

// number of unassigned channel ids quoted in the warning
const UNASSIGNED_SAMPLE: usize = 10;

/// What started a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Startup,
    Scheduled,
    Operator,
}

impl TriggerSource {
    fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Operator => "operator",
        }
    }
}

/// Outcome of one committed rebalance.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub version: u64,
    pub coverage: f64,
    pub imbalance: f64,
    pub per_account: BTreeMap<AccountId, usize>,
    pub accounts_changed: usize,
    pub accounts_notified: usize,
    pub unassigned: Vec<ChannelId>,
    pub unresolved: Vec<String>,
    pub warnings: Vec<String>,
    pub computed_at: DateTime<Utc>,
    pub trigger: TriggerSource,
    pub summary: RedistributionSummary,
}

/// Read-only view served by the admin API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebalanceStatus {
    /// Last committed version, 0 before the first rebalance.
    pub version: u64,
    pub coverage: Option<f64>,
    pub imbalance: Option<f64>,
    pub per_account: BTreeMap<AccountId, usize>,
    pub computed_at: Option<DateTime<Utc>>,
    pub accounts_changed: usize,
    pub summary: Option<String>,
    /// Error of the most recent rebalance, cleared by the next successful one.
    pub last_error: Option<String>,
    pub rebalances: u64,
    pub failures: u64,
}

/// Audit entry written under `/warden/rebalance/history/{version}`.
#[derive(Debug, Serialize)]
struct RebalanceRecord<'a> {
    version: u64,
    computed_at: DateTime<Utc>,
    trigger: TriggerSource,
    coverage: f64,
    imbalance: f64,
    accounts_changed: usize,
    accounts_notified: usize,
    added: usize,
    removed: usize,
    unassigned: &'a [ChannelId],
}

/// RebalanceTrigger - the only writer of the assignment
///
/// ## Sequence of one rebalance
/// 1. snapshot membership (roster) and account weights
/// 2. run the balancer
/// 3. diff against the committed assignment
/// 4. write the new assignment (single wholesale replace)
/// 5. notify only the accounts whose channel set changed
/// 6. log and record coverage, imbalance and the redistribution summary
///
/// Any failure up to and including step 4 aborts the cycle: nothing is notified and
/// the previous assignment stays authoritative. Once the write succeeds the
/// rebalance is committed; notifications are best effort and never retried here.
///
/// Rebalances never interleave. A request arriving while one runs waits for it
/// and then runs on its own.
pub struct RebalanceTrigger {
    store: AssignmentStore,
    notifier: ChangeNotifier,
    meta_store: Arc<dyn MetadataStore>,
    membership: Arc<dyn MembershipSource>,
    load_manager: LoadManager,
    guard: Mutex<()>,
    status: RwLock<RebalanceStatus>,
}

impl std::fmt::Debug for RebalanceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebalanceTrigger").finish_non_exhaustive()
    }
}

impl RebalanceTrigger {
    pub fn new(
        meta_store: Arc<dyn MetadataStore>,
        membership: Arc<dyn MembershipSource>,
        load_manager: LoadManager,
    ) -> Self {
        RebalanceTrigger {
            store: AssignmentStore::new(meta_store.clone()),
            notifier: ChangeNotifier::new(meta_store.clone()),
            meta_store,
            membership,
            load_manager,
            guard: Mutex::new(()),
            status: RwLock::new(RebalanceStatus::default()),
        }
    }

    /// Seeds the status from the committed assignment, so that a restarted
    /// coordinator reports the current version before its first rebalance.
    pub async fn load_status(&self) -> Result<()> {
        let current = self
            .store
            .read_current()
            .await
            .context("unable to read the committed assignment")?;

        if let Some(assignment) = current {
            let mut status = self.status.write().await;
            status.version = assignment.version;
            status.computed_at = Some(assignment.computed_at);
            status.per_account = assignment
                .per_account()
                .into_iter()
                .map(|(account, channels)| (account, channels.len()))
                .collect();
            gauge!(ASSIGNMENT_VERSION.name).set(assignment.version as f64);
            info!(
                version = assignment.version,
                channels = assignment.mapping.len(),
                "found committed assignment"
            );
        }
        Ok(())
    }

    pub async fn status(&self) -> RebalanceStatus {
        self.status.read().await.clone()
    }

    /// Runs one rebalance, waiting for a rebalance already in progress to finish first.
    ///
    /// The cycle runs on its own task: dropping the returned future only abandons the
    /// wait, a committed rebalance still notifies, records history and updates the status.
    pub async fn run_rebalance(
        self: &Arc<Self>,
        trigger: TriggerSource,
    ) -> Result<RebalanceReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_guarded(trigger).await })
            .await
            .context("rebalance task failed")?
    }

    async fn run_guarded(&self, trigger: TriggerSource) -> Result<RebalanceReport> {
        let _guard = self.guard.lock().await;
        let started = Instant::now();

        let result = self.rebalance(trigger).await;
        histogram!(REBALANCE_DURATION_SECONDS.name).record(started.elapsed().as_secs_f64());

        let mut status = self.status.write().await;
        match &result {
            Ok(report) => {
                counter!(REBALANCE_TOTAL.name, "trigger" => trigger.as_str()).increment(1);
                status.version = report.version;
                status.coverage = Some(report.coverage);
                status.imbalance = Some(report.imbalance);
                status.per_account = report.per_account.clone();
                status.computed_at = Some(report.computed_at);
                status.accounts_changed = report.accounts_changed;
                status.summary = Some(report.summary.to_string());
                status.last_error = None;
                status.rebalances += 1;
            }
            Err(e) => {
                counter!(REBALANCE_FAILURES_TOTAL.name, "trigger" => trigger.as_str()).increment(1);
                error!(trigger = trigger.as_str(), error = %format!("{:#}", e), "rebalance aborted, previous assignment stays in place");
                status.last_error = Some(format!("{:#}", e));
                status.failures += 1;
            }
        }

        result
    }

    async fn rebalance(&self, trigger: TriggerSource) -> Result<RebalanceReport> {
        let input = self
            .membership
            .load(Utc::now())
            .await
            .context("membership unavailable")?;
        let weights = self.load_manager.weights().await;

        let outcome = balance(&input.universe, &input.membership, &weights);

        if outcome.no_channels() {
            warn!("no channels configured, the assignment will be empty");
        } else if input.membership.is_empty() {
            warn!(
                channels = input.universe.len(),
                ineligible = input.membership.ineligible().len(),
                "no eligible accounts, no channel can be assigned"
            );
        }
        if !outcome.unassigned.is_empty() {
            let sample: Vec<String> = outcome
                .unassigned
                .iter()
                .take(UNASSIGNED_SAMPLE)
                .map(|c| c.to_string())
                .collect();
            warn!(
                count = outcome.unassigned.len(),
                sample = %sample.join(","),
                "channels without an eligible account under capacity"
            );
        }

        let previous = self
            .store
            .read_current()
            .await
            .context("unable to read the committed assignment")?
            .map(|assignment| assignment.mapping)
            .unwrap_or_default();

        let diff = AssignmentDiff::between(&previous, &outcome.mapping);
        let summary = RedistributionSummary::new(
            &previous,
            &outcome.mapping,
            &diff,
            &input.universe,
            input.membership.capacities(),
        );

        let assignment = self
            .store
            .write(outcome.mapping.clone())
            .await
            .context("failed to write the new assignment")?;

        // committed: from here on nothing aborts the rebalance
        let changed: Vec<&AccountId> = diff.changed_accounts().collect();
        let accounts_notified = self.notifier.notify_all(changed.iter().copied()).await;
        if accounts_notified < changed.len() {
            counter!(NOTIFICATION_FAILURES_TOTAL.name)
                .increment((changed.len() - accounts_notified) as u64);
        }

        let per_account = outcome.channel_counts();
        self.publish_gauges(
            assignment.version,
            outcome.coverage,
            outcome.imbalance,
            &per_account,
            &previous,
        );
        gauge!(ACCOUNTS_NOTIFIED.name).set(accounts_notified as f64);

        info!(
            version = assignment.version,
            coverage = outcome.coverage,
            imbalance = outcome.imbalance,
            accounts_changed = diff.len(),
            timestamp = %assignment.computed_at.to_rfc3339(),
            "rebalance committed"
        );
        info!(version = assignment.version, "{}", summary);

        let report = RebalanceReport {
            version: assignment.version,
            coverage: outcome.coverage,
            imbalance: outcome.imbalance,
            per_account,
            accounts_changed: diff.len(),
            accounts_notified,
            unassigned: outcome.unassigned,
            unresolved: input.universe.unresolved().to_vec(),
            warnings: input.warnings,
            computed_at: assignment.computed_at,
            trigger,
            summary,
        };

        self.record_history(&report).await;
        Ok(report)
    }

    fn publish_gauges(
        &self,
        version: u64,
        coverage: f64,
        imbalance: f64,
        per_account: &BTreeMap<AccountId, usize>,
        previous: &Mapping,
    ) {
        gauge!(ASSIGNMENT_VERSION.name).set(version as f64);
        gauge!(ASSIGNMENT_COVERAGE.name).set(coverage);
        gauge!(ASSIGNMENT_IMBALANCE.name).set(imbalance);
        for (account, channels) in per_account {
            gauge!(ACCOUNT_CHANNELS.name, "account" => account.to_string()).set(*channels as f64);
        }
        for account in departed_accounts(previous, per_account) {
            gauge!(ACCOUNT_CHANNELS.name, "account" => account.to_string()).set(0.0);
        }
    }

    /// Best effort audit record; a failure is logged and does not undo the commit.
    async fn record_history(&self, report: &RebalanceReport) {
        let record = RebalanceRecord {
            version: report.version,
            computed_at: report.computed_at,
            trigger: report.trigger,
            coverage: report.coverage,
            imbalance: report.imbalance,
            accounts_changed: report.accounts_changed,
            accounts_notified: report.accounts_notified,
            added: report.summary.added,
            removed: report.summary.removed,
            unassigned: &report.unassigned,
        };

        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(version = report.version, error = %e, "failed to encode rebalance history");
                return;
            }
        };

        if let Err(e) = self
            .meta_store
            .put(&history_path(report.version), value, MetaOptions::None)
            .await
        {
            warn!(version = report.version, error = %e, "failed to record rebalance history");
        }
    }
}

/// Previous owners that no longer appear in the new per-account counts.
fn departed_accounts<'a>(
    previous: &'a Mapping,
    per_account: &BTreeMap<AccountId, usize>,
) -> BTreeSet<&'a AccountId> {
    previous
        .values()
        .filter(|account| !per_account.contains_key(*account))
        .collect()
}

/// Runs a rebalance every `interval` until `shutdown` flips to true.
///
/// With `run_on_start` the first rebalance happens immediately, otherwise one
/// full interval after startup. A failed cycle is logged and the loop carries on.
pub fn start_rebalancing_loop(
    trigger: Arc<RebalanceTrigger>,
    interval: Duration,
    run_on_start: bool,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_seconds = interval.as_secs(),
            run_on_start, "starting scheduled rebalancing loop"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        if !run_on_start {
            ticker.tick().await;
        }
        let mut source = if run_on_start {
            TriggerSource::Startup
        } else {
            TriggerSource::Scheduled
        };

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // errors are recorded in the status by run_rebalance
                    let _ = trigger.run_rebalance(source).await;
                    source = TriggerSource::Scheduled;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("rebalancing loop stopped");
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "rebalance_test.rs"]
mod rebalance_test;
