use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::assignment::group_by_account;
use crate::{AccountId, AssignmentDiff, ChannelId, ChannelUniverse, Mapping};

const SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub channels: usize,
    pub load: f64,
    pub capacity: Option<f64>,
    pub added: usize,
    pub removed: usize,
    pub added_sample: Vec<ChannelId>,
    pub removed_sample: Vec<ChannelId>,
}

/// Human readable account of what a rebalance moved, kept in the status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedistributionSummary {
    pub universe_size: usize,
    pub covered_before: usize,
    pub covered_after: usize,
    pub added: usize,
    pub removed: usize,
    pub load_spread_before: f64,
    pub load_spread_after: f64,
    pub avg_load_before: f64,
    pub avg_load_after: f64,
    pub per_account: BTreeMap<AccountId, AccountSummary>,
}

fn loads(mapping: &Mapping, universe: &ChannelUniverse) -> BTreeMap<AccountId, f64> {
    group_by_account(mapping)
        .into_iter()
        .map(|(account, channels)| {
            let load = channels.iter().map(|c| universe.weight(*c)).sum();
            (account, load)
        })
        .collect()
}

/// (spread, average) of the given loads
fn spread(loads: &BTreeMap<AccountId, f64>) -> (f64, f64) {
    if loads.is_empty() {
        return (0.0, 0.0);
    }
    let min = loads.values().copied().fold(f64::INFINITY, f64::min);
    let max = loads.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = loads.values().sum::<f64>() / loads.len() as f64;
    (max - min, avg)
}

fn covered(mapping: &Mapping, universe: &ChannelUniverse) -> usize {
    mapping.keys().filter(|c| universe.contains(**c)).count()
}

impl RedistributionSummary {
    pub fn new(
        previous: &Mapping,
        next: &Mapping,
        diff: &AssignmentDiff,
        universe: &ChannelUniverse,
        capacities: &BTreeMap<AccountId, f64>,
    ) -> Self {
        let loads_before = loads(previous, universe);
        let loads_after = loads(next, universe);
        let (load_spread_before, avg_load_before) = spread(&loads_before);
        let (load_spread_after, avg_load_after) = spread(&loads_after);

        let after = group_by_account(next);
        let accounts: BTreeSet<&AccountId> = after.keys().chain(diff.changed_accounts()).collect();

        let per_account = accounts
            .into_iter()
            .map(|account| {
                let change = diff.change_for(account).cloned().unwrap_or_default();
                let summary = AccountSummary {
                    channels: after.get(account).map(|c| c.len()).unwrap_or(0),
                    load: loads_after.get(account).copied().unwrap_or(0.0),
                    capacity: capacities.get(account).copied(),
                    added: change.added.len(),
                    removed: change.removed.len(),
                    added_sample: change.added.iter().take(SAMPLE_LIMIT).copied().collect(),
                    removed_sample: change.removed.iter().take(SAMPLE_LIMIT).copied().collect(),
                };
                (account.clone(), summary)
            })
            .collect();

        RedistributionSummary {
            universe_size: universe.len(),
            covered_before: covered(previous, universe),
            covered_after: covered(next, universe),
            added: diff.added_total(),
            removed: diff.removed_total(),
            load_spread_before,
            load_spread_after,
            avg_load_before,
            avg_load_after,
            per_account,
        }
    }

    fn percent(&self, covered: usize) -> f64 {
        if self.universe_size == 0 {
            return 0.0;
        }
        covered as f64 / self.universe_size as f64 * 100.0
    }
}

fn ids(sample: &[ChannelId]) -> String {
    let ids: Vec<String> = sample.iter().map(|c| c.to_string()).collect();
    format!("[{}]", ids.join(", "))
}

impl fmt::Display for RedistributionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let before = self.percent(self.covered_before);
        let after = self.percent(self.covered_after);

        writeln!(f, "redistribution summary")?;
        writeln!(
            f,
            "- coverage: {}->{} of {} ({:.1}% -> {:.1}%, {:+.1} pp)",
            self.covered_before,
            self.covered_after,
            self.universe_size,
            before,
            after,
            after - before
        )?;
        writeln!(
            f,
            "- changes: +{} assigned, -{} removed (net {:+})",
            self.added,
            self.removed,
            self.added as i64 - self.removed as i64
        )?;
        write!(
            f,
            "- load spread: {:.2} -> {:.2} (avg {:.2} -> {:.2})",
            self.load_spread_before, self.load_spread_after, self.avg_load_before, self.avg_load_after
        )?;

        for (account, summary) in &self.per_account {
            write!(
                f,
                "\n  {}: channels={}, load={:.2}",
                account, summary.channels, summary.load
            )?;
            if let Some(capacity) = summary.capacity.filter(|c| *c > 0.0) {
                write!(
                    f,
                    "/{:.2} ({:.0}%)",
                    capacity,
                    summary.load / capacity * 100.0
                )?;
            }
            write!(f, ", +{}/-{}", summary.added, summary.removed)?;
            if !summary.added_sample.is_empty() || !summary.removed_sample.is_empty() {
                write!(
                    f,
                    " add={} remove={}",
                    ids(&summary.added_sample),
                    ids(&summary.removed_sample)
                )?;
            }
        }
        Ok(())
    }
}
