use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

use crate::{AccountId, ChannelId, Result, WardenError};

const DEFAULT_CHANNEL_WEIGHT: f64 = 1.0;

/// A channel as written in the roster file: a numeric id, a weighted id, or a
/// handle/link that still has to be resolved to a numeric id by someone else.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Id(i64),
    Weighted {
        id: i64,
        #[serde(default)]
        weight: Option<f64>,
    },
    Handle(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    pub id: String,
    /// `None` (or `null`) when membership has not been fetched yet.
    #[serde(default)]
    pub membership: Option<Vec<ChannelRef>>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Raw, loosely typed roster as refreshed by the onboarding tooling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub channels: Vec<ChannelRef>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl RosterConfig {
    /// Reads a roster file. JSON documents are valid YAML, so one parser covers both.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WardenError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(RosterConfig::default());
        }
        serde_yaml::from_str(content).map_err(|e| WardenError::Roster(e.to_string()))
    }

    /// Validates the raw roster once, at the boundary. Problems are logged and
    /// recorded as warnings; the offending entries are left out.
    pub fn validate(self) -> (ChannelUniverse, Roster) {
        let universe = ChannelUniverse::from_refs(&self.channels);
        let roster = Roster::from_entries(self.accounts);
        (universe, roster)
    }
}

enum Unresolved {
    Handle(String),
    Invalid(String),
}

fn resolve(reference: &ChannelRef) -> std::result::Result<(ChannelId, Option<f64>), Unresolved> {
    let (id, weight) = match reference {
        ChannelRef::Id(id) => (*id, None),
        ChannelRef::Weighted { id, weight } => (*id, *weight),
        // numeric ids quoted in YAML are still ids
        ChannelRef::Handle(handle) => match handle.trim().parse::<i64>() {
            Ok(id) => (id, None),
            Err(_) => return Err(Unresolved::Handle(handle.clone())),
        },
    };
    ChannelId::new(id)
        .map(|channel| (channel, weight))
        .map_err(|e| Unresolved::Invalid(e.to_string()))
}

/// The channels that should be watched, with their relative weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelUniverse {
    weights: BTreeMap<ChannelId, f64>,
    unresolved: Vec<String>,
    warnings: Vec<String>,
}

impl ChannelUniverse {
    pub fn from_ids(ids: impl IntoIterator<Item = ChannelId>) -> Self {
        ChannelUniverse {
            weights: ids.into_iter().map(|id| (id, DEFAULT_CHANNEL_WEIGHT)).collect(),
            ..Default::default()
        }
    }

    pub fn from_refs(refs: &[ChannelRef]) -> Self {
        let mut universe = ChannelUniverse::default();

        for reference in refs {
            match resolve(reference) {
                Ok((id, weight)) => {
                    let weight = match weight {
                        Some(w) if w.is_finite() && w > 0.0 => w,
                        Some(w) => {
                            universe.warn(format!(
                                "channel {} has invalid weight {}, using {}",
                                id, w, DEFAULT_CHANNEL_WEIGHT
                            ));
                            DEFAULT_CHANNEL_WEIGHT
                        }
                        None => DEFAULT_CHANNEL_WEIGHT,
                    };
                    if universe.weights.insert(id, weight).is_some() {
                        universe.warn(format!("channel {} listed more than once", id));
                    }
                }
                Err(Unresolved::Handle(handle)) => universe.unresolved.push(handle),
                Err(Unresolved::Invalid(reason)) => {
                    universe.warn(format!("skipping channel entry: {}", reason))
                }
            }
        }

        if !universe.unresolved.is_empty() {
            warn!(
                count = universe.unresolved.len(),
                "channels without a numeric id are excluded until resolved"
            );
        }
        universe
    }

    pub fn with_weight(mut self, id: ChannelId, weight: f64) -> Self {
        self.weights.insert(id, weight);
        self
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Channel ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.weights.keys().copied()
    }

    pub fn weight(&self, id: ChannelId) -> f64 {
        self.weights.get(&id).copied().unwrap_or(DEFAULT_CHANNEL_WEIGHT)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.weights.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountProfile {
    pub id: AccountId,
    pub membership: Option<BTreeSet<ChannelId>>,
    pub capacity: Option<f64>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Validated account roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    accounts: BTreeMap<AccountId, AccountProfile>,
    warnings: Vec<String>,
}

impl Roster {
    pub fn from_profiles(profiles: impl IntoIterator<Item = AccountProfile>) -> Self {
        Roster {
            accounts: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
            warnings: Vec::new(),
        }
    }

    fn from_entries(entries: Vec<AccountEntry>) -> Self {
        let mut roster = Roster::default();

        for entry in entries {
            let id = match AccountId::new(entry.id.clone()) {
                Ok(id) => id,
                Err(e) => {
                    roster.warn(format!("skipping account: {}", e));
                    continue;
                }
            };
            if roster.accounts.contains_key(&id) {
                roster.warn(format!("account {} listed more than once, keeping the first", id));
                continue;
            }

            let membership = entry.membership.map(|refs| {
                refs.iter()
                    .filter_map(|r| resolve(r).ok().map(|(channel, _)| channel))
                    .collect::<BTreeSet<_>>()
            });

            let capacity = match entry.capacity {
                Some(c) if c.is_finite() && c >= 0.0 => Some(c),
                Some(c) => {
                    roster.warn(format!("account {} has invalid capacity {}, ignoring it", id, c));
                    None
                }
                None => None,
            };

            roster.accounts.insert(
                id.clone(),
                AccountProfile {
                    id,
                    membership,
                    capacity,
                    refreshed_at: entry.refreshed_at,
                },
            );
        }
        roster
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountProfile> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Freezes membership for one rebalance cycle.
    ///
    /// Accounts with missing membership, or whose membership is older than
    /// `max_age`, are ineligible for every channel in this cycle.
    pub fn snapshot(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> MembershipSnapshot {
        let mut snapshot = MembershipSnapshot {
            taken_at: now,
            ..Default::default()
        };

        for profile in self.accounts.values() {
            let Some(membership) = &profile.membership else {
                snapshot.ineligible.insert(profile.id.clone());
                continue;
            };

            if let Some(max_age) = max_age {
                let fresh = profile
                    .refreshed_at
                    .map(|at| now.signed_duration_since(at) <= max_age)
                    .unwrap_or(false);
                if !fresh {
                    snapshot.ineligible.insert(profile.id.clone());
                    continue;
                }
            }

            snapshot.members.insert(profile.id.clone(), membership.clone());
            if let Some(capacity) = profile.capacity {
                snapshot.capacities.insert(profile.id.clone(), capacity);
            }
        }

        snapshot
    }
}

/// Per-account membership frozen for one rebalance cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipSnapshot {
    pub taken_at: DateTime<Utc>,
    members: BTreeMap<AccountId, BTreeSet<ChannelId>>,
    capacities: BTreeMap<AccountId, f64>,
    ineligible: BTreeSet<AccountId>,
}

impl MembershipSnapshot {
    pub fn new(members: BTreeMap<AccountId, BTreeSet<ChannelId>>) -> Self {
        MembershipSnapshot {
            taken_at: Utc::now(),
            members,
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, account_id: AccountId, capacity: f64) -> Self {
        self.capacities.insert(account_id, capacity);
        self
    }

    pub fn is_member(&self, account_id: &AccountId, channel: ChannelId) -> bool {
        self.members
            .get(account_id)
            .map(|m| m.contains(&channel))
            .unwrap_or(false)
    }

    /// Eligible accounts in lexicographic order.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.members.keys()
    }

    pub fn capacity(&self, account_id: &AccountId) -> Option<f64> {
        self.capacities.get(account_id).copied()
    }

    pub fn capacities(&self) -> &BTreeMap<AccountId, f64> {
        &self.capacities
    }

    pub fn ineligible(&self) -> &BTreeSet<AccountId> {
        &self.ineligible
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
#[path = "roster_test.rs"]
mod roster_test;
