//! Per-instance lifecycle state machine
//!
//! ```text
//! declared -> resolving -> resolved -> deployed -> removed
//!                 |            |          |          |
//!                 +-> declared +-> resolving         +-> declared
//! ```
//!
//! A removed instance re-enters through `declared`; it can never jump
//! straight back to `deployed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::InstanceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Declared,
    Resolving,
    Resolved,
    Deployed,
    Removed,
}

impl InstanceState {
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Declared, Resolving)
                | (Declared, Removed)
                | (Resolving, Resolved)
                | (Resolving, Declared)
                | (Resolved, Deployed)
                | (Resolved, Resolving)
                | (Resolved, Removed)
                | (Deployed, Resolving)
                | (Deployed, Removed)
                | (Removed, Declared)
        )
    }

    /// Move to `next`, or fail with [`Error::InvalidTransition`]
    pub fn transition(self, instance: &InstanceRef, next: InstanceState) -> Result<InstanceState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                instance: instance.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Declared => "declared",
            InstanceState::Resolving => "resolving",
            InstanceState::Resolved => "resolved",
            InstanceState::Deployed => "deployed",
            InstanceState::Removed => "removed",
        };
        f.write_str(name)
    }
}
