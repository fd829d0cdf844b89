//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::config::ConfigStore;
use crate::distribute::DistributionLedger;
use crate::error::Result;
use crate::fs::project_state_dir;
use crate::lifecycle::LifecycleLedger;
use crate::secrets::{GeneratedSecretStore, SecretSources};

/// Unified application context for dependency injection.
///
/// Owns the project root and the per-project state directory. Frontends
/// create this once and hand out services from it.
#[derive(Debug, Clone)]
pub struct AppContext {
    project_root: PathBuf,
    state_dir: PathBuf,
}

impl AppContext {
    /// Create a new context with explicit paths.
    pub fn new(project_root: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            project_root,
            state_dir,
        }
    }

    /// Create a context using the default state directory of `project_root`.
    pub fn for_project(project_root: PathBuf) -> Result<Self> {
        let state_dir = project_state_dir(&project_root)?;
        Ok(Self::new(project_root, state_dir))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the ConfigStore for berth.toml.
    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_project_root(self.project_root.clone())
    }

    /// Get the store of project-generated secrets.
    pub fn generated_store(&self) -> GeneratedSecretStore {
        GeneratedSecretStore::new(self.state_dir.clone())
    }

    /// Get the three secret layers of the project.
    pub fn secret_sources(&self) -> SecretSources {
        SecretSources::new(self.project_root.clone(), self.generated_store())
    }

    /// Get the instance lifecycle ledger.
    pub fn lifecycle_ledger(&self) -> LifecycleLedger {
        LifecycleLedger::new(self.state_dir.clone())
    }

    /// Get the distribution ledger.
    pub fn distribution_ledger(&self) -> DistributionLedger {
        DistributionLedger::new(self.state_dir.clone())
    }
}
