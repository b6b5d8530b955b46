use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use warden_core::{ChannelUniverse, MembershipSnapshot, Roster, RosterConfig};

/// Inputs of one rebalance cycle, frozen at the moment the cycle starts.
#[derive(Debug, Clone)]
pub struct MembershipInput {
    pub universe: ChannelUniverse,
    pub membership: MembershipSnapshot,
    /// Configuration problems found while validating the roster.
    pub warnings: Vec<String>,
}

impl MembershipInput {
    pub fn new(universe: ChannelUniverse, membership: MembershipSnapshot) -> Self {
        let mut warnings = universe.warnings().to_vec();
        if !universe.unresolved().is_empty() {
            warnings.push(format!(
                "{} channel(s) without a numeric id excluded: {}",
                universe.unresolved().len(),
                universe.unresolved().join(", ")
            ));
        }
        MembershipInput {
            universe,
            membership,
            warnings,
        }
    }

    fn from_roster(
        universe: ChannelUniverse,
        roster: &Roster,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Self {
        let membership = roster.snapshot(now, max_age);
        let mut input = MembershipInput::new(universe, membership);
        input.warnings.extend(roster.warnings().iter().cloned());
        input
    }
}

/// Source of the channel universe and account membership, refreshed by a
/// collaborator outside the coordinator and read once per rebalance.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn load(&self, now: DateTime<Utc>) -> Result<MembershipInput>;
}

/// Roster file on disk, re-read at the start of every rebalance.
///
/// A file that cannot be read or parsed fails the load, so the cycle is aborted
/// and the committed assignment stays in place.
#[derive(Debug, Clone)]
pub struct FileMembershipSource {
    path: PathBuf,
    max_age: Option<Duration>,
}

impl FileMembershipSource {
    pub fn new(path: impl Into<PathBuf>, max_age: Option<Duration>) -> Self {
        FileMembershipSource {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl MembershipSource for FileMembershipSource {
    async fn load(&self, now: DateTime<Utc>) -> Result<MembershipInput> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("unable to read roster file {}", self.path.display()))?;
        let config = RosterConfig::parse(&content)
            .with_context(|| format!("unable to parse roster file {}", self.path.display()))?;

        let (universe, roster) = config.validate();
        Ok(MembershipInput::from_roster(universe, &roster, now, self.max_age))
    }
}

/// Fixed universe and roster, used when membership is provided programmatically.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    universe: ChannelUniverse,
    roster: Roster,
    max_age: Option<Duration>,
}

impl StaticMembership {
    pub fn new(universe: ChannelUniverse, roster: Roster) -> Self {
        StaticMembership {
            universe,
            roster,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn load(&self, now: DateTime<Utc>) -> Result<MembershipInput> {
        Ok(MembershipInput::from_roster(
            self.universe.clone(),
            &self.roster,
            now,
            self.max_age,
        ))
    }
}
