use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::AccountId;

/// LoadReport holds the throughput an account listener observed over its last
/// reporting interval.
///
/// Each listener periodically posts its report to the metadata store; the load
/// manager folds `events_per_minute` into the account's smoothed weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub account_id: AccountId,
    /// Accepted (forwarded) events per minute over the interval
    pub events_per_minute: f64,
    /// Size of the allowed channel set while sampling
    pub allowed_channels: usize,
    pub sampled_at: DateTime<Utc>,
}

/// Generates a load report from the number of events forwarded during `interval`.
pub fn generate_load_report(
    account_id: AccountId,
    forwarded: u64,
    interval: Duration,
    allowed_channels: usize,
) -> LoadReport {
    let minutes = interval.as_secs_f64() / 60.0;
    let events_per_minute = if minutes > 0.0 {
        forwarded as f64 / minutes
    } else {
        0.0
    };

    LoadReport {
        account_id,
        events_per_minute,
        allowed_channels,
        sampled_at: Utc::now(),
    }
}
