//! Config store for loading berth.toml.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::parser::{self, ProjectDocument};

/// File name of the project configuration
pub const CONFIG_FILE: &str = "berth.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigStore {
    pub fn from_project_root(project_root: PathBuf) -> Self {
        Self {
            config_path: project_root.join(CONFIG_FILE),
            project_root,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn load(&self) -> Result<ProjectDocument> {
        if !self.config_path.exists() {
            return Err(Error::io(format!(
                "No {} found in {}",
                CONFIG_FILE,
                self.project_root.display()
            )));
        }
        parser::parse_berth_toml(&self.config_path)
    }
}
