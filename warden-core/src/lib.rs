//! Shared building blocks of the Warden assignment engine.
//!
//! The coordinator and every account listener agree on the types in this crate
//! and on the metadata keys in [`paths`]. The [`AssignmentStore`] is the single
//! source of truth for "which account watches which channel"; the
//! [`ChangeNotifier`] only tells an account to go and re-read it.

mod errors;
pub use errors::{Result, WardenError};

mod ids;
pub use ids::{AccountId, ChannelId};

mod assignment;
pub use assignment::{AccountChange, Assignment, AssignmentDiff, AssignmentRecord, Mapping};

mod roster;
pub use roster::{
    AccountEntry, AccountProfile, ChannelRef, ChannelUniverse, MembershipSnapshot, Roster,
    RosterConfig,
};

mod summary;
pub use summary::RedistributionSummary;

pub mod paths;

mod assignment_store;
pub use assignment_store::AssignmentStore;

mod notifier;
pub use notifier::{ChangeNotifier, ReloadSignal};
