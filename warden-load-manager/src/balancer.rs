use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use warden_core::{AccountId, ChannelId, ChannelUniverse, Mapping, MembershipSnapshot};

use crate::weights::WeightSnapshot;

// absorbs float noise when comparing assigned weight against a capacity
const CAPACITY_EPSILON: f64 = 1e-9;

/// Result of one balancer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceOutcome {
    pub mapping: Mapping,
    /// Assigned share of the universe, 1.0 for an empty universe.
    pub coverage: f64,
    /// Spread of assigned weight across accounts eligible for at least one channel.
    pub imbalance: f64,
    /// Channels with no eligible account under capacity.
    pub unassigned: Vec<ChannelId>,
    /// Assigned weight per eligible account, including accounts that received nothing.
    pub loads: BTreeMap<AccountId, f64>,
}

impl BalanceOutcome {
    pub fn no_channels(&self) -> bool {
        self.mapping.is_empty() && self.unassigned.is_empty()
    }

    pub fn channel_counts(&self) -> BTreeMap<AccountId, usize> {
        let mut counts: BTreeMap<AccountId, usize> =
            self.loads.keys().map(|account| (account.clone(), 0)).collect();
        for owner in self.mapping.values() {
            *counts.entry(owner.clone()).or_default() += 1;
        }
        counts
    }
}

struct Candidate<'a> {
    account_id: &'a AccountId,
    running: f64,
    assigned: f64,
    capacity: Option<f64>,
    eligible_somewhere: bool,
}

/// Greedy weighted load balancing.
///
/// ## Algorithm
/// - Every account starts with a running load equal to its smoothed weight.
/// - Channels are processed in ascending id order.
/// - Each channel goes to the member account with the lowest running load whose
///   assigned weight stays within its capacity; ties go to the lexicographically
///   smallest account id.
/// - The winner's running load grows by the channel weight.
///
/// Identical inputs always produce an identical mapping. Channels nobody can
/// take stay unassigned.
pub fn balance(
    universe: &ChannelUniverse,
    membership: &MembershipSnapshot,
    weights: &WeightSnapshot,
) -> BalanceOutcome {
    // accounts() iterates in lexicographic order, which the tie-break relies on
    let mut candidates: Vec<Candidate<'_>> = membership
        .accounts()
        .map(|account_id| Candidate {
            account_id,
            running: weights.get(account_id),
            assigned: 0.0,
            capacity: membership.capacity(account_id),
            eligible_somewhere: false,
        })
        .collect();

    let mut mapping = Mapping::new();
    let mut unassigned = Vec::new();

    for channel in universe.ids() {
        let weight = universe.weight(channel);
        let mut chosen: Option<(usize, f64)> = None;

        for (idx, candidate) in candidates.iter_mut().enumerate() {
            if !membership.is_member(candidate.account_id, channel) {
                continue;
            }
            candidate.eligible_somewhere = true;

            if let Some(capacity) = candidate.capacity {
                if candidate.assigned + weight > capacity + CAPACITY_EPSILON {
                    continue;
                }
            }

            // strictly lower wins, a tie keeps the earlier (smaller) account id
            let better = match chosen {
                None => true,
                Some((_, best)) => candidate.running.total_cmp(&best) == Ordering::Less,
            };
            if better {
                chosen = Some((idx, candidate.running));
            }
        }

        match chosen {
            Some((idx, _)) => {
                let winner = &mut candidates[idx];
                winner.running += weight;
                winner.assigned += weight;
                mapping.insert(channel, winner.account_id.clone());
            }
            None => unassigned.push(channel),
        }
    }

    let loads: BTreeMap<AccountId, f64> = candidates
        .iter()
        .filter(|c| c.eligible_somewhere)
        .map(|c| (c.account_id.clone(), c.assigned))
        .collect();

    BalanceOutcome {
        coverage: coverage(mapping.len(), universe.len()),
        imbalance: spread(loads.values().copied()),
        mapping,
        unassigned,
        loads,
    }
}

fn coverage(assigned: usize, universe: usize) -> f64 {
    if universe == 0 {
        return 1.0;
    }
    assigned as f64 / universe as f64
}

fn spread(loads: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = loads.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), load| {
        (min.min(load), max.max(load))
    });
    if min.is_finite() {
        max - min
    } else {
        0.0
    }
}

#[cfg(test)]
#[path = "balancer_test.rs"]
mod balancer_test;
