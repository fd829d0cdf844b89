//! Instance rendering: resolved instances into the deployment artifact
//! consumed by the provisioning and compose steps.

pub mod artifact;

pub use artifact::{RenderedDeployment, RenderedInstance};

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use crate::attach::AppEnvironment;
use crate::catalog::AddonCatalog;
use crate::error::{Error, Result};
use crate::resolve::DeploymentPlan;
use crate::variables::{ResolvedVariables, container_name};

/// Combines plan, variables and project identity into a [`RenderedDeployment`]
pub struct InstanceRenderer<'a> {
    project: &'a str,
    catalog: &'a AddonCatalog,
}

impl<'a> InstanceRenderer<'a> {
    pub fn new(project: &'a str, catalog: &'a AddonCatalog) -> Self {
        Self { project, catalog }
    }

    pub fn render(
        &self,
        plan: &DeploymentPlan,
        variables: &[ResolvedVariables],
        apps: Vec<AppEnvironment>,
    ) -> Result<RenderedDeployment> {
        let by_instance: BTreeMap<_, _> = variables.iter().map(|v| (&v.instance, v)).collect();

        let mut instances = Vec::with_capacity(plan.len());
        for entry in plan.entries() {
            let instance = &entry.instance;
            let key = instance.key.to_string();
            let definition = self.catalog.get(&instance.addon_type, &key)?;
            let resolved = by_instance.get(&instance.key).ok_or_else(|| {
                Error::validation(format!("addon instance '{}' has no resolved variables", key))
            })?;
            let resources = definition
                .plan(instance.plan_name())
                .cloned()
                .ok_or_else(|| {
                    Error::validation(format!(
                        "addon instance '{}' uses unknown plan '{}'",
                        key,
                        instance.plan_name()
                    ))
                })?;

            let name = container_name(self.project, &instance.key);
            instances.push(RenderedInstance {
                key: instance.key.clone(),
                addon_type: instance.addon_type.clone(),
                version: instance.version.clone(),
                container_name: name.clone(),
                hostname: name,
                ports: definition.ports.clone(),
                plan: instance.plan_name().to_string(),
                resources,
                env: resolved.env(),
                secret_names: resolved.secret_names(),
                secret_keys: resolved.secret_keys(),
                healthcheck: definition.healthcheck.clone(),
                dependencies: entry.dependencies.clone(),
                origin: instance.origin.clone(),
            });
        }

        info!(
            project = %self.project,
            instances = instances.len(),
            apps = apps.len(),
            "Rendered deployment"
        );
        Ok(RenderedDeployment {
            project: self.project.to_string(),
            generated_at: Utc::now(),
            instances,
            apps,
        })
    }
}
