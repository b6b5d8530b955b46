//! # Warden Load Manager
//!
//! Decides which account watches which channel.
//!
//! ## Core Responsibilities
//!
//! - **Balancing**: [`balance`] is a pure, deterministic function from
//!   (channel universe, membership, account weights) to an assignment mapping
//!   plus coverage and imbalance metrics
//! - **Load Tracking**: [`WeightTracker`] keeps an exponentially smoothed load
//!   estimate per account, floored so that idle accounts stay eligible
//! - **Load Reports**: [`LoadManager`] watches the per-account load reports
//!   posted by the listeners and feeds them into the tracker

mod balancer;
pub mod load_report;
mod manager;
mod weights;

pub use balancer::{balance, BalanceOutcome};
pub use load_report::{generate_load_report, LoadReport};
pub use manager::LoadManager;
pub use weights::{
    SmoothedWeight, WeightParams, WeightSnapshot, WeightTracker, DEFAULT_WEIGHT_ALPHA,
    DEFAULT_WEIGHT_MIN,
};
