//! Owning-project marker on execution hosts
//!
//! Written once at registration and checked before every job, independent
//! of label routing. A mismatch is fatal and never retried.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const DEFAULT_MARKER_PATH: &str = "/etc/berth/project";
const UNREGISTERED: &str = "(unregistered)";

#[derive(Debug, Clone)]
pub struct ProjectMarker {
    path: PathBuf,
}

impl Default for ProjectMarker {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_MARKER_PATH))
    }
}

impl ProjectMarker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owning project, `None` when the host was never registered
    pub fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let project = content.trim();
        Ok((!project.is_empty()).then(|| project.to_string()))
    }

    /// Persist the owning project
    ///
    /// Re-registering to a different project requires `force`.
    pub fn register(&self, project: &str, force: bool) -> Result<()> {
        if let Some(current) = self.read()?
            && current != project
            && !force
        {
            return Err(Error::validation(format!(
                "host is registered to project '{}'; re-register explicitly to change it",
                current
            )));
        }

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::io(format!("{} has no parent", self.path.display())))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let tmp = dir.join(format!(".project.{}.tmp", std::process::id()));
        fs::write(&tmp, format!("{}\n", project))
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to rename {}", tmp.display()))?;
        info!(project = %project, marker = %self.path.display(), "Registered host project");
        Ok(())
    }

    /// Abort unless the host belongs to `job_project`
    pub fn verify(&self, job_project: &str) -> Result<()> {
        let host_project = self.read()?.unwrap_or_else(|| UNREGISTERED.to_string());
        if host_project != job_project {
            return Err(Error::ProjectMismatch {
                job_project: job_project.to_string(),
                host_project,
            });
        }
        debug!(project = %job_project, "Host project verified");
        Ok(())
    }
}
