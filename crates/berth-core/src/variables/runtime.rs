//! Host-derived facts available to `runtime`-source variables.
//!
//! Addons share one container network per project, so the internal host of
//! an instance is its container name.

use crate::catalog::AddonDefinition;
use crate::instance::AddonInstance;
use crate::types::InstanceRef;

/// Fact names a definition may reference
pub const KNOWN_FACTS: &[&str] = &["host", "port", "address", "project", "instance", "category"];

/// Container (and internal DNS) name of an instance
pub fn container_name(project: &str, key: &InstanceRef) -> String {
    format!("{}-{}-{}", project, key.category(), key.instance())
}

/// The port other containers connect to: the one named after the addon,
/// otherwise the lexically first declared port.
pub fn primary_port(definition: &AddonDefinition) -> Option<u16> {
    definition
        .ports
        .get(&definition.name)
        .or_else(|| definition.ports.values().next())
        .copied()
}

/// Facts about the deployment host and project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFacts {
    project: String,
}

impl RuntimeFacts {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Value of `fact` for one instance, `None` when it does not apply
    pub fn fact(
        &self,
        fact: &str,
        instance: &AddonInstance,
        definition: &AddonDefinition,
    ) -> Option<String> {
        match fact {
            "host" => Some(container_name(&self.project, &instance.key)),
            "port" => primary_port(definition).map(|p| p.to_string()),
            "address" => primary_port(definition).map(|p| {
                format!("{}:{}", container_name(&self.project, &instance.key), p)
            }),
            "project" => Some(self.project.clone()),
            "instance" => Some(instance.instance_name().to_string()),
            "category" => Some(instance.category().to_string()),
            _ => None,
        }
    }
}
