use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;
use warden_core::{AccountId, ChannelId};

use crate::filter::ChannelFilter;
use crate::listener_metrics::{LISTENER_EVENTS_DROPPED_TOTAL, LISTENER_EVENTS_FORWARDED_TOTAL};
use crate::ListenerError;

/// An event received by the protocol listener. The payload is opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub channel_id: ChannelId,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Downstream consumer of accepted events (job queue, classifier, ...).
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn forward(&self, account_id: &AccountId, event: InboundEvent) -> Result<(), ListenerError>;
}

#[derive(Debug, Default)]
pub struct GateCounters {
    // reset by the load reporter at every report
    forwarded_since_report: AtomicU64,
    dropped: AtomicU64,
}

impl GateCounters {
    pub fn take_forwarded(&self) -> u64 {
        self.forwarded_since_report.swap(0, Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drops events for channels this account does not own and forwards the rest.
pub struct EventGate<S> {
    account_id: AccountId,
    filter: ChannelFilter,
    sink: S,
    counters: Arc<GateCounters>,
}

impl<S: EventSink> EventGate<S> {
    pub fn new(account_id: AccountId, filter: ChannelFilter, sink: S) -> Self {
        EventGate {
            account_id,
            filter,
            sink,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Returns `Ok(false)` when the event was dropped by the filter.
    pub async fn accept(&self, event: InboundEvent) -> Result<bool, ListenerError> {
        if !self.filter.is_allowed(event.channel_id) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            counter!(LISTENER_EVENTS_DROPPED_TOTAL.name, "account" => self.account_id.to_string())
                .increment(1);
            trace!(account_id = %self.account_id, channel_id = %event.channel_id, "event dropped");
            return Ok(false);
        }

        self.sink.forward(&self.account_id, event).await?;
        self.counters
            .forwarded_since_report
            .fetch_add(1, Ordering::Relaxed);
        counter!(LISTENER_EVENTS_FORWARDED_TOTAL.name, "account" => self.account_id.to_string())
            .increment(1);
        Ok(true)
    }

    pub fn counters(&self) -> Arc<GateCounters> {
        self.counters.clone()
    }

    pub fn filter(&self) -> &ChannelFilter {
        &self.filter
    }
}
