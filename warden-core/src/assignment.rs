use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{AccountId, ChannelId, WardenError};

/// Channel -> owning account. A channel absent from the mapping is unassigned.
pub type Mapping = BTreeMap<ChannelId, AccountId>;

/// Immutable, versioned snapshot of who watches which channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub version: u64,
    pub mapping: Mapping,
    pub computed_at: DateTime<Utc>,
}

impl Assignment {
    pub fn channels_for(&self, account_id: &AccountId) -> BTreeSet<ChannelId> {
        self.mapping
            .iter()
            .filter(|(_, owner)| *owner == account_id)
            .map(|(channel, _)| *channel)
            .collect()
    }

    /// Groups the mapping by owner; accounts with no channel are absent.
    pub fn per_account(&self) -> BTreeMap<AccountId, BTreeSet<ChannelId>> {
        group_by_account(&self.mapping)
    }

    pub fn to_record(&self) -> AssignmentRecord {
        AssignmentRecord {
            version: self.version,
            computed_at: self.computed_at,
            accounts: self.per_account(),
        }
    }
}

pub(crate) fn group_by_account(mapping: &Mapping) -> BTreeMap<AccountId, BTreeSet<ChannelId>> {
    let mut out: BTreeMap<AccountId, BTreeSet<ChannelId>> = BTreeMap::new();
    for (channel, owner) in mapping {
        out.entry(owner.clone()).or_default().insert(*channel);
    }
    out
}

/// Stored form of an [`Assignment`], keyed by account so a listener finds its
/// own channels with a single lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub accounts: BTreeMap<AccountId, BTreeSet<ChannelId>>,
}

impl TryFrom<AssignmentRecord> for Assignment {
    type Error = WardenError;

    fn try_from(record: AssignmentRecord) -> Result<Self, Self::Error> {
        let mut mapping = Mapping::new();
        for (account_id, channels) in record.accounts {
            for channel in channels {
                if let Some(previous) = mapping.insert(channel, account_id.clone()) {
                    return Err(WardenError::CorruptAssignment(format!(
                        "channel {} owned by both {} and {} in version {}",
                        channel, previous, account_id, record.version
                    )));
                }
            }
        }
        Ok(Assignment {
            version: record.version,
            mapping,
            computed_at: record.computed_at,
        })
    }
}

/// Channels gained and lost by one account between two assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountChange {
    pub added: BTreeSet<ChannelId>,
    pub removed: BTreeSet<ChannelId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentDiff {
    changes: BTreeMap<AccountId, AccountChange>,
}

impl AssignmentDiff {
    pub fn between(previous: &Mapping, next: &Mapping) -> Self {
        let mut changes: BTreeMap<AccountId, AccountChange> = BTreeMap::new();

        let channels: BTreeSet<&ChannelId> = previous.keys().chain(next.keys()).collect();
        for channel in channels {
            let before = previous.get(channel);
            let after = next.get(channel);
            if before == after {
                continue;
            }
            if let Some(owner) = before {
                changes.entry(owner.clone()).or_default().removed.insert(*channel);
            }
            if let Some(owner) = after {
                changes.entry(owner.clone()).or_default().added.insert(*channel);
            }
        }

        AssignmentDiff { changes }
    }

    /// Accounts whose allowed channel set differs, the ones to notify.
    pub fn changed_accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.changes.keys()
    }

    pub fn change_for(&self, account_id: &AccountId) -> Option<&AccountChange> {
        self.changes.get(account_id)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn added_total(&self) -> usize {
        self.changes.values().map(|c| c.added.len()).sum()
    }

    pub fn removed_total(&self) -> usize {
        self.changes.values().map(|c| c.removed.len()).sum()
    }
}
