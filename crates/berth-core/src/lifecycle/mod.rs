//! Addon instance lifecycle tracking.

pub mod ledger;
pub mod state;

pub use ledger::{InstanceRecord, LifecycleDocument, LifecycleLedger};
pub use state::InstanceState;
