//! Addon instances: concrete, named deployments of an addon within a project.

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::types::InstanceRef;

/// Plan used when a declaration does not name one
pub const DEFAULT_PLAN: &str = "default";

/// Why an instance is part of the deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum InstanceOrigin {
    /// Declared in berth.toml
    Declared,
    /// Added because another instance requires its type
    Required { by: InstanceRef },
    /// Force-included infrastructure role
    Infrastructure,
}

/// A concrete addon instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonInstance {
    pub key: InstanceRef,
    /// Addon type (catalog name)
    pub addon_type: String,
    pub version: Option<String>,
    pub plan: Option<String>,
    #[serde(default)]
    pub options: toml::Table,
    pub origin: InstanceOrigin,
}

impl AddonInstance {
    pub fn declared(key: InstanceRef, addon_type: impl Into<String>) -> Self {
        Self {
            key,
            addon_type: addon_type.into(),
            version: None,
            plan: None,
            options: toml::Table::new(),
            origin: InstanceOrigin::Declared,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_options(mut self, options: toml::Table) -> Self {
        self.options = options;
        self
    }

    pub fn plan_name(&self) -> &str {
        self.plan.as_deref().unwrap_or(DEFAULT_PLAN)
    }

    pub fn category(&self) -> &str {
        self.key.category()
    }

    pub fn instance_name(&self) -> &str {
        self.key.instance()
    }
}

/// Collect every declared instance from the project configuration
pub fn instances_from_config(config: &ProjectConfig) -> Vec<AddonInstance> {
    config
        .instance_declarations()
        .map(|(key, decl)| AddonInstance {
            key,
            addon_type: decl.addon_type.clone(),
            version: decl.version.clone(),
            plan: decl.plan.clone(),
            options: decl.options.clone(),
            origin: InstanceOrigin::Declared,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_berth_toml_str;

    #[test]
    fn instances_carry_declaration_fields() {
        let doc = parse_berth_toml_str(
            r#"
[project]
name = "shop"

[addons.databases.primary]
type = "postgres"
version = "16"
plan = "small"

[addons.databases.primary.options]
database = "orders"
"#,
        )
        .unwrap();

        let instances = instances_from_config(&doc.config);
        assert_eq!(instances.len(), 1);
        let primary = &instances[0];
        assert_eq!(primary.key.to_string(), "databases.primary");
        assert_eq!(primary.addon_type, "postgres");
        assert_eq!(primary.version.as_deref(), Some("16"));
        assert_eq!(primary.plan_name(), "small");
        assert_eq!(primary.origin, InstanceOrigin::Declared);
        assert!(primary.options.contains_key("database"));
    }

    #[test]
    fn plan_defaults_to_default() {
        let inst = AddonInstance::declared(InstanceRef::new("caches", "main"), "redis");
        assert_eq!(inst.plan_name(), DEFAULT_PLAN);
    }
}
