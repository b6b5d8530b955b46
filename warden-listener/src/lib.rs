//! Account-side half of Warden.
//!
//! An [`AccountListener`] runs next to the long-lived protocol connection of one
//! account. It keeps the account's allowed channel set in sync with the
//! assignment store, triggered by reload signals and by a periodic fallback
//! read, and swaps the set in atomically. The protocol side consults a
//! [`ChannelFilter`] (or an [`EventGate`]) before forwarding anything downstream.

mod errors;
pub use errors::ListenerError;

mod filter;
pub use filter::{AllowedChannels, ChannelFilter};

mod listener;
pub use listener::{AccountListener, ListenerConfig, ListenerState};

mod sink;
pub use sink::{EventGate, EventSink, GateCounters, InboundEvent};

mod load_reporter;
pub use load_reporter::LoadReporter;

pub mod listener_metrics;
