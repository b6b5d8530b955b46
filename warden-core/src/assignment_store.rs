use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use warden_metadata_store::{MetaOptions, MetadataStore};

use crate::paths::ASSIGNMENT_CURRENT_PATH;
use crate::{AccountId, Assignment, AssignmentRecord, ChannelId, Mapping, Result};

/// Versioned, durable record of the current assignment.
///
/// The whole assignment lives in one composite record that is replaced by a
/// single `put`, so a reader sees either the previous or the new version of an
/// account's channels and never a mix of both.
#[derive(Clone)]
pub struct AssignmentStore {
    meta_store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for AssignmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentStore").finish_non_exhaustive()
    }
}

impl AssignmentStore {
    pub fn new(meta_store: Arc<dyn MetadataStore>) -> Self {
        AssignmentStore { meta_store }
    }

    pub async fn read_current(&self) -> Result<Option<Assignment>> {
        let value = self
            .meta_store
            .get(ASSIGNMENT_CURRENT_PATH, MetaOptions::None)
            .await?;

        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let record: AssignmentRecord = serde_json::from_value(value)?;
                Ok(Some(Assignment::try_from(record)?))
            }
        }
    }

    /// Current version and the channels owned by `account_id`.
    ///
    /// Returns version 0 and no channels before the first rebalance.
    pub async fn read(&self, account_id: &AccountId) -> Result<(u64, BTreeSet<ChannelId>)> {
        let value = self
            .meta_store
            .get(ASSIGNMENT_CURRENT_PATH, MetaOptions::None)
            .await?;

        match value {
            None | Some(Value::Null) => Ok((0, BTreeSet::new())),
            Some(value) => {
                let mut record: AssignmentRecord = serde_json::from_value(value)?;
                let channels = record.accounts.remove(account_id).unwrap_or_default();
                Ok((record.version, channels))
            }
        }
    }

    /// Replaces the current assignment wholesale and returns it with its new version.
    ///
    /// Only the rebalance trigger calls this, under its own guard, so reading the
    /// previous version and writing the next one cannot interleave with another writer.
    pub async fn write(&self, mapping: Mapping) -> Result<Assignment> {
        let previous_version = self
            .read_current()
            .await?
            .map(|assignment| assignment.version)
            .unwrap_or(0);

        let assignment = Assignment {
            version: previous_version + 1,
            mapping,
            computed_at: Utc::now(),
        };

        let record = serde_json::to_value(assignment.to_record())?;
        self.meta_store
            .put(ASSIGNMENT_CURRENT_PATH, record, MetaOptions::None)
            .await?;

        debug!(
            version = assignment.version,
            channels = assignment.mapping.len(),
            "assignment written"
        );
        Ok(assignment)
    }
}
