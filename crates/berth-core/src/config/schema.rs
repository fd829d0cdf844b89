//! Configuration schema for berth.toml
//!
//! Defines the typed view of a project's configuration:
//! - `[project]`: identity and VM role
//! - `[addons.<category>.<instance>]`: addon declarations
//! - `[apps.<name>]`: application attachments
//! - `[runner]`: fixed runner labels and guard marker location
//! - `[distribution]`: secret distribution targets

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::distribute::target::DistributionTarget;
use crate::error::{Error, Result};
use crate::types::{AccessMode, InstanceRef};

/// Root configuration structure for berth.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,

    /// Addon declarations: category -> instance -> declaration
    #[serde(default)]
    pub addons: BTreeMap<String, BTreeMap<String, AddonDeclaration>>,

    /// Application declarations
    #[serde(default)]
    pub apps: BTreeMap<String, AppDeclaration>,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub distribution: DistributionSection,
}

/// Project identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name; used in container names and runner labels
    pub name: String,

    /// VM role of the host this project deploys to
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "app".to_string()
}

/// One addon instance declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonDeclaration {
    /// Addon type (catalog name)
    #[serde(rename = "type")]
    pub addon_type: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub plan: Option<String>,

    /// Free-form options, reachable by `config_path` lookups
    #[serde(default)]
    pub options: toml::Table,
}

/// Application declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDeclaration {
    #[serde(default)]
    pub addons: Vec<AttachmentSpec>,
}

/// Binding of an application to an addon instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    /// Referenced instance, `category.instance`
    #[serde(rename = "addon")]
    pub addon_ref: InstanceRef,

    /// Environment variable prefix
    #[serde(rename = "as")]
    pub alias: String,

    #[serde(default)]
    pub access: AccessMode,
}

/// Runner registration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Labels added to every runner of this project
    #[serde(default)]
    pub labels: Vec<String>,

    /// Location of the owning-project marker on execution hosts
    #[serde(default)]
    pub marker_path: Option<PathBuf>,
}

/// Secret distribution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionSection {
    #[serde(default)]
    pub targets: Vec<DistributionTarget>,

    #[serde(default)]
    pub public_key: Option<PublicKeyConfig>,
}

/// How to fetch the execution host's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyConfig {
    /// Command whose stdout is the recipient public key
    pub command: Vec<String>,
}

impl ProjectConfig {
    /// Validate the configuration after parsing
    pub fn validate(&self) -> Result<()> {
        validate_name("project name", &self.project.name)?;
        validate_name("project role", &self.project.role)?;

        for (category, instances) in &self.addons {
            validate_name("addon category", category)?;
            for (instance, decl) in instances {
                validate_name("addon instance", instance)?;
                if decl.addon_type.trim().is_empty() {
                    return Err(Error::validation(format!(
                        "addon '{}.{}' has an empty type",
                        category, instance
                    )));
                }
            }
        }

        let mut target_names = BTreeSet::new();
        for target in &self.distribution.targets {
            if !target_names.insert(target.name.as_str()) {
                return Err(Error::validation(format!(
                    "distribution target '{}' is declared more than once",
                    target.name
                )));
            }
        }

        if let Some(key) = &self.distribution.public_key
            && key.command.is_empty()
        {
            return Err(Error::validation(
                "distribution.public_key.command must not be empty",
            ));
        }

        Ok(())
    }

    /// All declared instances in `category.instance` order
    pub fn instance_declarations(&self) -> impl Iterator<Item = (InstanceRef, &AddonDeclaration)> {
        self.addons.iter().flat_map(|(category, instances)| {
            instances
                .iter()
                .map(move |(instance, decl)| (InstanceRef::new(category, instance), decl))
        })
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !value.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} '{}' must be lowercase alphanumeric with '-' or '_'",
            what, value
        )))
    }
}
