//! Runner label computation
//!
//! A host registered for a project carries `{self-hosted, <project>, <role>}`
//! plus the project's fixed labels. The orchestration host serves every
//! project and carries a project-agnostic set instead. Jobs declare the set
//! a host must carry; matching is done by the CI system.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::error::{Error, Result};

pub const SELF_HOSTED: &str = "self-hosted";
pub const MULTI_PROJECT: &str = "multi-project";
/// Host role shared by all projects
pub const ORCHESTRATION_ROLE: &str = "orchestration";

/// Sorted, de-duplicated label set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerLabelSet(BTreeSet<String>);

impl RunnerLabelSet {
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|l| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every label of `self` is present on `host`
    pub fn is_satisfied_by(&self, host: &RunnerLabelSet) -> bool {
        self.0.is_subset(&host.0)
    }
}

impl<S: Into<String>> FromIterator<S> for RunnerLabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for RunnerLabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// Computes host and job label sets for one project
#[derive(Debug, Clone)]
pub struct LabelRouter {
    project: String,
    fixed: Vec<String>,
}

impl LabelRouter {
    pub fn new(project: impl Into<String>, fixed: Vec<String>) -> Result<Self> {
        let project = project.into();
        validate_label(&project)?;
        for label in &fixed {
            validate_label(label)?;
        }
        Ok(Self { project, fixed })
    }

    pub fn from_config(config: &ProjectConfig) -> Result<Self> {
        Self::new(config.project.name.clone(), config.runner.labels.clone())
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Labels attached to a host at registration
    pub fn host_labels(&self, role: &str) -> Result<RunnerLabelSet> {
        validate_label(role)?;
        let base = self.base_labels(role);
        Ok(base.into_iter().chain(self.fixed.iter().cloned()).collect())
    }

    /// Labels a job must require to land on this project's `role` host
    pub fn job_labels(&self, role: &str) -> Result<RunnerLabelSet> {
        validate_label(role)?;
        if role == ORCHESTRATION_ROLE {
            return Ok(self.base_labels(role).into_iter().collect());
        }
        Ok(self
            .base_labels(role)
            .into_iter()
            .chain(self.fixed.iter().cloned())
            .collect())
    }

    fn base_labels(&self, role: &str) -> Vec<String> {
        if role == ORCHESTRATION_ROLE {
            vec![
                SELF_HOSTED.to_string(),
                ORCHESTRATION_ROLE.to_string(),
                MULTI_PROJECT.to_string(),
            ]
        } else {
            vec![
                SELF_HOSTED.to_string(),
                self.project.clone(),
                role.to_string(),
            ]
        }
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.contains(',') || label.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!("invalid runner label '{}'", label)));
    }
    Ok(())
}
