//! Addon definition schema
//!
//! Definitions are TOML documents, one per addon type:
//!
//! ```toml
//! name = "postgres"
//! category = "databases"
//! multi_instance = true
//! requires = []
//! conflicts = ["mysql"]
//!
//! [[variables]]
//! name = "{INSTANCE}_POSTGRES_PASSWORD"
//! source = "secret"
//! secret_key = "{CATEGORY}_{INSTANCE}_POSTGRES_PASSWORD"
//! is_secret = true
//! generate = true
//! export = "PASSWORD"
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Immutable addon definition loaded once per process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonDefinition {
    /// Addon type name (e.g. `postgres`)
    pub name: String,

    /// Category new instances are placed in when auto-added
    pub category: String,

    /// Human description
    #[serde(default)]
    pub description: String,

    /// Whether a project may declare more than one instance of this type
    #[serde(default)]
    pub multi_instance: bool,

    /// Force-included in every deployment (the git/CI host role)
    #[serde(default)]
    pub required_infrastructure: bool,

    /// Default version used when an instance omits one
    #[serde(default)]
    pub default_version: Option<String>,

    /// Addon types that must be present in the deployment
    #[serde(default)]
    pub requires: BTreeSet<String>,

    /// Addon types that may not be deployed alongside this one
    #[serde(default)]
    pub conflicts: BTreeSet<String>,

    /// Container ports, keyed by port name
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,

    /// Variables resolved for every instance, in declaration order
    #[serde(default)]
    pub variables: Vec<VariableSpec>,

    /// Parallel credential set for readonly attachments
    #[serde(default)]
    pub readonly_variables: Vec<VariableSpec>,

    /// Resource plans keyed by plan name
    #[serde(default)]
    pub plans: BTreeMap<String, ResourcePlan>,

    #[serde(default)]
    pub healthcheck: Option<HealthSpec>,
}

impl AddonDefinition {
    /// Whether readonly attachments get a dedicated credential set
    pub fn supports_readonly(&self) -> bool {
        !self.readonly_variables.is_empty()
    }

    /// Look up a plan by name
    pub fn plan(&self, name: &str) -> Option<&ResourcePlan> {
        self.plans.get(name)
    }
}

/// Where a variable's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    /// Merged secret bundle, looked up by `secret_key`
    Secret,
    /// Project configuration tree, walked by `config_path`
    Config,
    /// Host-derived facts (see `variables::runtime`)
    Runtime,
    /// The `default` value verbatim
    Literal,
}

/// Declared variable of an addon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Variable name; may contain `{INSTANCE}` and `{CATEGORY}`
    pub name: String,

    pub source: VariableSource,

    /// Dotted path into the project config (source = config)
    #[serde(default)]
    pub config_path: Option<String>,

    /// Key in the merged secret bundle (source = secret)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Runtime fact name (source = runtime)
    #[serde(default)]
    pub fact: Option<String>,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub is_secret: bool,

    /// Generate and persist a random value when absent everywhere
    #[serde(default)]
    pub generate: bool,

    /// Suffix exposed to attached applications as `{ALIAS}_{export}`
    #[serde(default)]
    pub export: Option<String>,
}

/// Resource sizing for one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// CPU cores (fractional strings such as "0.5" are allowed)
    pub cpus: String,
    /// Memory limit, e.g. "512m"
    pub memory: String,
    #[serde(default)]
    pub storage: Option<String>,
}

/// Container health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSpec {
    pub command: Vec<String>,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_interval() -> String {
    "10s".to_string()
}

fn default_retries() -> u32 {
    5
}
