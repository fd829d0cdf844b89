//! Error types for berth operations
//!
//! Resolution-phase errors abort a run before anything is rendered or
//! distributed. Distribution-phase failures are collected per target and key
//! and surfaced together as [`Error::Distribution`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for berth operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Addon dependency graph contains a cycle
    #[error("cyclic addon dependency: {}", .members.join(" -> "))]
    CyclicDependency {
        /// Instance keys participating in the cycle, first member repeated last
        members: Vec<String>,
    },

    /// Two addons in the resolved set declare a conflict
    #[error("addon '{first}' conflicts with '{second}'")]
    Conflict {
        /// Instance key that declares (or is declared in) the conflict
        first: String,
        /// The other instance key
        second: String,
    },

    /// A required variable has no value in any source
    #[error("addon instance '{instance}' is missing required variable '{variable}'")]
    MissingVariable {
        /// Instance key (`category.instance`)
        instance: String,
        /// Concrete environment variable name
        variable: String,
    },

    /// Requested addon type is not in the catalog
    #[error("unknown addon type '{addon_type}' requested by '{requested_by}'")]
    UnknownAddon {
        /// The type name that was looked up
        addon_type: String,
        /// Instance key or definition that referenced it
        requested_by: String,
    },

    /// Same `category.instance` declared twice
    #[error("addon instance '{0}' is declared more than once")]
    DuplicateInstance(String),

    /// The execution host has no usable public key yet
    #[error("encryption key not ready: {0}")]
    EncryptionKeyUnavailable(String),

    /// One or more writes failed during distribution
    #[error("secret distribution failed: {0}")]
    Distribution(DistributionFailures),

    /// A job was dispatched to a host owned by another project
    #[error("project mismatch: job declares '{job_project}' but host belongs to '{host_project}'")]
    ProjectMismatch {
        /// Project declared by the job
        job_project: String,
        /// Project persisted on the host
        host_project: String,
    },

    /// Addon definition violates a catalog invariant
    #[error("invalid addon definition '{addon}': {reason}")]
    InvalidDefinition {
        /// Definition name
        addon: String,
        /// What is wrong
        reason: String,
    },

    /// An application attaches to an instance that does not exist
    #[error("application '{app}' attaches to unknown addon instance '{addon_ref}'")]
    UnknownAttachment {
        /// Application name
        app: String,
        /// Referenced `category.instance`
        addon_ref: String,
    },

    /// An application uses the same alias twice
    #[error("application '{app}' uses alias '{alias}' more than once")]
    DuplicateAlias {
        /// Application name
        app: String,
        /// Offending alias
        alias: String,
    },

    /// Lifecycle state machine rejected a transition
    #[error("addon instance '{instance}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Instance key
        instance: String,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Configuration or input validation error
    #[error("validation error: {0}")]
    Validation(String),

    /// File-system error with path context
    #[error("io error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an io error with the given message
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid-definition error
    pub fn invalid_definition(addon: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            addon: addon.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-variable error
    pub fn missing_variable(instance: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::MissingVariable {
            instance: instance.into(),
            variable: variable.into(),
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Resolution errors and project mismatches are deterministic: the same
    /// input produces the same failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EncryptionKeyUnavailable(_) | Error::Distribution(_) | Error::Io(_)
        )
    }

    /// Whether this error belongs to the resolution phase
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::CyclicDependency { .. }
                | Error::Conflict { .. }
                | Error::MissingVariable { .. }
                | Error::UnknownAddon { .. }
                | Error::DuplicateInstance(_)
                | Error::InvalidDefinition { .. }
                | Error::UnknownAttachment { .. }
                | Error::DuplicateAlias { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Io(format!("{:#}", err))
    }
}

/// A single failed write to a distribution target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionWriteError {
    /// Target name
    pub target: String,
    /// Secret key (or blob name for blob delivery)
    pub key: String,
    /// Failure reason reported by the transport
    pub reason: String,
}

impl fmt::Display for DistributionWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.target, self.key, self.reason)
    }
}

/// Aggregate of every write failure in one distribution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionFailures(pub Vec<DistributionWriteError>);

impl DistributionFailures {
    /// Number of failed writes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing failed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the individual failures
    pub fn iter(&self) -> impl Iterator<Item = &DistributionWriteError> {
        self.0.iter()
    }
}

impl fmt::Display for DistributionFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} write(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}
