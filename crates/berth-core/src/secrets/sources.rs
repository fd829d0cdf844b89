//! On-disk secret sources of a project
//!
//! - infrastructure: `.berth/infrastructure.toml`, a flat table
//! - project-generated: see [`GeneratedSecretStore`]
//! - overrides: every `.berth/overrides/*.env` in lexical order, later files win

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::error::{Error, Result};

use super::layer::{SecretLayer, SecretStack, SecretTier};
use super::store::GeneratedSecretStore;

pub const SECRETS_DIR: &str = ".berth";
pub const INFRASTRUCTURE_FILE: &str = "infrastructure.toml";
pub const OVERRIDES_DIR: &str = "overrides";

/// Locations of the three layers for one project
#[derive(Debug, Clone)]
pub struct SecretSources {
    project_root: PathBuf,
    generated: GeneratedSecretStore,
}

impl SecretSources {
    pub fn new(project_root: PathBuf, generated: GeneratedSecretStore) -> Self {
        Self {
            project_root,
            generated,
        }
    }

    pub fn infrastructure_path(&self) -> PathBuf {
        self.project_root.join(SECRETS_DIR).join(INFRASTRUCTURE_FILE)
    }

    pub fn overrides_dir(&self) -> PathBuf {
        self.project_root.join(SECRETS_DIR).join(OVERRIDES_DIR)
    }

    pub fn generated(&self) -> &GeneratedSecretStore {
        &self.generated
    }

    /// Read all three layers from disk
    pub fn load_stack(&self) -> Result<SecretStack> {
        let stack = SecretStack::new(
            load_infrastructure(&self.infrastructure_path())?,
            self.generated.load_layer()?,
            load_overrides(&self.overrides_dir())?,
        );
        debug!(
            infrastructure = stack.infrastructure.len(),
            generated = stack.generated.len(),
            overrides = stack.overrides.len(),
            "Loaded secret layers"
        );
        Ok(stack)
    }
}

/// Load the infrastructure layer; a missing file is an empty layer
pub fn load_infrastructure(path: &Path) -> Result<SecretLayer> {
    let mut layer = SecretLayer::new(SecretTier::Infrastructure);
    if !path.exists() {
        return Ok(layer);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| Error::serialization(format!("{}: {}", path.display(), e.message())))?;

    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            _ => {
                return Err(Error::validation(format!(
                    "{}: secret '{}' must be a scalar value",
                    path.display(),
                    key
                )));
            }
        };
        layer.insert(key, value);
    }
    Ok(layer)
}

/// Load every `*.env` file of the overrides directory into one layer
pub fn load_overrides(dir: &Path) -> Result<SecretLayer> {
    let mut layer = SecretLayer::new(SecretTier::Override);
    if !dir.is_dir() {
        return Ok(layer);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "env"))
        .collect();
    files.sort();

    for file in files {
        let content = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let entries = parse_env(&content, &file.display().to_string())?;
        debug!(file = %file.display(), keys = entries.len(), "Applied override file");
        layer.entries.extend(entries);
    }
    Ok(layer)
}

/// Parse `KEY=VALUE` lines; `#` starts a comment line, values may be quoted
pub fn parse_env(content: &str, origin: &str) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::validation(format!("{}:{}: expected KEY=VALUE", origin, index + 1))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::validation(format!(
                "{}:{}: empty key",
                origin,
                index + 1
            )));
        }
        entries.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(entries)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
