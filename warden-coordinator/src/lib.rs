//! # Warden Coordinator
//!
//! Single writer of the channel assignment.
//!
//! - [`rebalance::RebalanceTrigger`] runs the rebalance sequence, on a schedule and on
//!   operator request, never two at a time
//! - [`membership`] supplies the channel universe and roster for each cycle
//! - [`admin`] serves the operator surface (`/status`, `/rebalance`, `/health`)
//! - [`service_configuration`] turns the YAML config into validated settings

pub mod admin;
pub mod args_parse;
pub mod coordinator_metrics;
pub mod membership;
pub mod rebalance;
pub mod service_configuration;
