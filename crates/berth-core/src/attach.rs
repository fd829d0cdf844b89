//! Application attachments
//!
//! An application binds to addon instances through aliases. Every exported
//! variable of the instance reaches the application as `{ALIAS}_{EXPORT}`, so
//! two applications (or one application twice) can consume the same instance
//! under independent prefixes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AppDeclaration, AttachmentSpec};
use crate::error::{Error, Result};
use crate::types::{AccessMode, InstanceRef, env_token};
use crate::variables::ResolvedVariables;

/// One wired attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentBinding {
    pub addon_ref: InstanceRef,
    pub alias: String,
    pub access: AccessMode,
    /// Whether the readonly credential set was applied
    pub readonly_credentials: bool,
    /// Variable names contributed by this attachment
    pub variables: Vec<String>,
}

/// Environment assembled for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEnvironment {
    pub app: String,
    pub bindings: Vec<AttachmentBinding>,
    pub env: BTreeMap<String, String>,
    /// Names in `env` that carry secret values
    pub secret_names: BTreeSet<String>,
}

impl AppEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(|v| v.as_str())
    }
}

/// Instances that some application attaches to readonly
pub fn readonly_instances(apps: &BTreeMap<String, AppDeclaration>) -> BTreeSet<InstanceRef> {
    apps.values()
        .flat_map(|app| app.addons.iter())
        .filter(|spec| spec.access == AccessMode::Readonly)
        .map(|spec| spec.addon_ref.clone())
        .collect()
}

/// Wires applications to resolved instance variables
pub struct AttachmentResolver<'a> {
    instances: BTreeMap<&'a InstanceRef, &'a ResolvedVariables>,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(resolved: &'a [ResolvedVariables]) -> Self {
        Self {
            instances: resolved.iter().map(|r| (&r.instance, r)).collect(),
        }
    }

    /// Build the environment of every application, in name order
    pub fn resolve_all(
        &self,
        apps: &BTreeMap<String, AppDeclaration>,
    ) -> Result<Vec<AppEnvironment>> {
        apps.iter()
            .map(|(name, app)| self.resolve_app(name, &app.addons))
            .collect()
    }

    pub fn resolve_app(&self, app: &str, attachments: &[AttachmentSpec]) -> Result<AppEnvironment> {
        let mut aliases = BTreeSet::new();
        for spec in attachments {
            if !aliases.insert(env_token(&spec.alias)) {
                return Err(Error::DuplicateAlias {
                    app: app.to_string(),
                    alias: spec.alias.clone(),
                });
            }
        }

        let mut env = BTreeMap::new();
        let mut secret_names = BTreeSet::new();
        let mut bindings = Vec::with_capacity(attachments.len());
        for spec in attachments {
            let resolved = self.instances.get(&spec.addon_ref).ok_or_else(|| {
                Error::UnknownAttachment {
                    app: app.to_string(),
                    addon_ref: spec.addon_ref.to_string(),
                }
            })?;

            let mut exports = resolved.exports();
            let mut readonly_credentials = false;
            if spec.access == AccessMode::Readonly
                && let Some(readonly) = resolved.readonly_exports()
            {
                exports.extend(readonly);
                readonly_credentials = true;
            }

            let prefix = env_token(&spec.alias);
            let mut variables = Vec::with_capacity(exports.len());
            for (suffix, export) in exports {
                let name = format!("{}_{}", prefix, suffix);
                if export.is_secret {
                    secret_names.insert(name.clone());
                }
                variables.push(name.clone());
                env.insert(name, export.value);
            }

            debug!(
                app = %app,
                addon = %spec.addon_ref,
                alias = %prefix,
                access = ?spec.access,
                "Wired attachment"
            );
            bindings.push(AttachmentBinding {
                addon_ref: spec.addon_ref.clone(),
                alias: prefix,
                access: spec.access,
                readonly_credentials,
                variables,
            });
        }

        Ok(AppEnvironment {
            app: app.to_string(),
            bindings,
            env,
            secret_names,
        })
    }
}
