//! Berth Core Library
//!
//! Resolves a project's addon declarations into an ordered, conflict-free
//! deployment plan, resolves every variable the addons and applications need,
//! and merges and distributes secrets to downstream stores.

pub mod attach;
pub mod catalog;
pub mod config;
pub mod context;
pub mod distribute;
pub mod error;
pub mod fs;
pub mod instance;
pub mod lifecycle;
pub mod pipeline;
pub mod render;
pub mod resolve;
pub mod runner;
pub mod secrets;
pub mod transport;
pub mod types;
pub mod variables;

pub use error::{Error, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Catalog
    pub use crate::catalog::{AddonCatalog, AddonDefinition, VariableSource, VariableSpec};

    // Configuration
    pub use crate::config::{AttachmentSpec, ConfigStore, ConfigTree, Lookup, ProjectConfig};

    // Resolution
    pub use crate::attach::{AppEnvironment, AttachmentResolver};
    pub use crate::instance::AddonInstance;
    pub use crate::resolve::{DependencyResolver, DeploymentPlan};
    pub use crate::variables::{ResolvedVariables, RuntimeFacts, VariableResolver};

    // Rendering and lifecycle
    pub use crate::lifecycle::{InstanceState, LifecycleLedger};
    pub use crate::render::{InstanceRenderer, RenderedDeployment};

    // Secrets
    pub use crate::distribute::{
        DistributionReport, DistributionTarget, Encryptor, PublicKeySource, SecretDistributor,
        SecretStoreClient, TargetBinding,
    };
    pub use crate::secrets::{GeneratedSecretStore, MergedBundle, SecretLayer, SecretTier};

    // Runner
    pub use crate::runner::{LabelRouter, ProjectMarker, RunnerLabelSet};

    // Context
    pub use crate::context::AppContext;
    pub use crate::pipeline::Pipeline;
    pub use crate::types::{AccessMode, InstanceRef};
    pub use crate::{Error, Result};
}
