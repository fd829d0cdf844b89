//! Distribution target declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Trust domain a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// CI build-time secret store
    Build,
    /// CI runtime environment store
    Runtime,
    /// Deployment-execution system store
    Execution,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Build => "build",
            TargetKind::Runtime => "runtime",
            TargetKind::Execution => "execution",
        })
    }
}

/// Visibility of secrets written to a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetScope {
    Repository,
    Environment(String),
}

impl TargetScope {
    /// URL path segment(s) for this scope
    pub fn path_segment(&self) -> String {
        match self {
            TargetScope::Repository => "repository".to_string(),
            TargetScope::Environment(env) => format!("environments/{}", env),
        }
    }
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScope::Repository => f.write_str("repository"),
            TargetScope::Environment(env) => write!(f, "environment:{}", env),
        }
    }
}

/// How the bundle reaches the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    /// One secret per key
    KeyValue,
    /// The whole bundle encrypted into one secret with the given name
    Blob(String),
}

/// A destination for the merged secret bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionTarget {
    pub name: String,
    pub kind: TargetKind,
    pub scope: TargetScope,
    pub delivery: Delivery,

    /// Key prefixes to include (whitelist wins over `ignore_keys`)
    #[serde(default)]
    pub keys: Option<Vec<String>>,

    /// Key prefixes to exclude
    #[serde(default)]
    pub ignore_keys: Option<Vec<String>>,

    /// Base URL of the target's secret API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Concurrent writes against this target
    #[serde(default)]
    pub parallelism: Option<usize>,
}

impl DistributionTarget {
    pub fn new(
        name: impl Into<String>,
        kind: TargetKind,
        scope: TargetScope,
        delivery: Delivery,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            scope,
            delivery,
            keys: None,
            ignore_keys: None,
            endpoint: None,
            parallelism: None,
        }
    }

    /// Identity used by the distribution ledger; changing kind or scope
    /// starts a fresh record
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.name, self.kind, self.scope)
    }
}
