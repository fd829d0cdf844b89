//! Variable resolution
//!
//! Turns an addon definition's declared variables into concrete values for
//! one instance. Sources are consulted per variable:
//!
//! - `secret`: merged secret bundle, then generation (when flagged), then default
//! - `config`: project configuration tree, then default
//! - `runtime`: host-derived facts, then default
//! - `literal`: default verbatim
//!
//! Resolution of a whole plan runs in two passes. The first pass never
//! generates anything and surfaces every missing required variable; only
//! when it succeeds does the second pass generate and persist secrets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{AddonCatalog, AddonDefinition, VariableSource, VariableSpec};
use crate::config::ConfigTree;
use crate::error::{Error, Result};
use crate::instance::AddonInstance;
use crate::resolve::DeploymentPlan;
use crate::secrets::{GeneratedSecretStore, MergedBundle};
use crate::types::InstanceRef;

use super::generate::generate_secret;
use super::runtime::RuntimeFacts;

/// Substitute `{INSTANCE}`/`{CATEGORY}` (environment form) and
/// `{instance}`/`{category}` (raw form)
pub fn substitute(template: &str, key: &InstanceRef) -> String {
    template
        .replace("{INSTANCE}", &key.env_instance())
        .replace("{CATEGORY}", &key.env_category())
        .replace("{instance}", key.instance())
        .replace("{category}", key.category())
}

/// One concrete variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariable {
    /// Concrete environment variable name
    pub name: String,
    pub value: String,
    pub source: VariableSource,
    pub is_secret: bool,
    /// Concrete secret key, for secret-source variables
    pub secret_key: Option<String>,
    /// Suffix exposed to attached applications
    pub export: Option<String>,
    /// Value fell back to the declared default
    pub defaulted: bool,
}

/// All variables of one instance, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariables {
    pub instance: InstanceRef,
    pub variables: Vec<ResolvedVariable>,
    /// Parallel readonly credential set; empty when not requested or unsupported
    pub readonly: Vec<ResolvedVariable>,
}

impl ResolvedVariables {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Environment map of the instance's own container
    pub fn env(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .chain(self.readonly.iter())
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    /// Exported values keyed by suffix (readwrite access)
    pub fn exports(&self) -> BTreeMap<String, Export> {
        export_map(&self.variables)
    }

    /// Exported readonly values keyed by suffix, `None` without a readonly set
    pub fn readonly_exports(&self) -> Option<BTreeMap<String, Export>> {
        if self.readonly.is_empty() {
            None
        } else {
            Some(export_map(&self.readonly))
        }
    }

    /// Names of variables holding secret values
    pub fn secret_names(&self) -> Vec<String> {
        self.variables
            .iter()
            .chain(self.readonly.iter())
            .filter(|v| v.is_secret)
            .map(|v| v.name.clone())
            .collect()
    }

    /// Secret keys referenced by this instance
    pub fn secret_keys(&self) -> Vec<String> {
        self.variables
            .iter()
            .chain(self.readonly.iter())
            .filter_map(|v| v.secret_key.clone())
            .collect()
    }
}

/// Value exposed to attached applications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub value: String,
    pub is_secret: bool,
}

fn export_map(vars: &[ResolvedVariable]) -> BTreeMap<String, Export> {
    vars.iter()
        .filter_map(|v| {
            v.export.as_ref().map(|suffix| {
                (
                    suffix.clone(),
                    Export {
                        value: v.value.clone(),
                        is_secret: v.is_secret,
                    },
                )
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Detect missing values without side effects
    Check,
    /// Generate and persist missing generated secrets
    Commit,
}

enum Outcome {
    Value { value: String, defaulted: bool },
    Generate { secret_key: String },
    Absent,
}

/// Resolves declared variables against config, secrets and host facts
pub struct VariableResolver<'a> {
    tree: &'a ConfigTree,
    bundle: &'a MergedBundle,
    facts: &'a RuntimeFacts,
    generated: &'a GeneratedSecretStore,
    readonly_for: BTreeSet<InstanceRef>,
}

impl<'a> VariableResolver<'a> {
    pub fn new(
        tree: &'a ConfigTree,
        bundle: &'a MergedBundle,
        facts: &'a RuntimeFacts,
        generated: &'a GeneratedSecretStore,
    ) -> Self {
        Self {
            tree,
            bundle,
            facts,
            generated,
            readonly_for: BTreeSet::new(),
        }
    }

    /// Instances that need their readonly credential set resolved
    pub fn with_readonly(mut self, instances: impl IntoIterator<Item = InstanceRef>) -> Self {
        self.readonly_for.extend(instances);
        self
    }

    /// Resolve every instance of a plan, failing before any secret is generated
    /// if a required variable is missing anywhere
    pub fn resolve_plan(
        &self,
        plan: &DeploymentPlan,
        catalog: &AddonCatalog,
    ) -> Result<Vec<ResolvedVariables>> {
        let definitions = plan
            .instances()
            .map(|inst| {
                catalog
                    .get(&inst.addon_type, &inst.key.to_string())
                    .map(|def| (inst, def))
            })
            .collect::<Result<Vec<_>>>()?;

        for (instance, definition) in &definitions {
            self.run(instance, definition, Pass::Check)?;
        }

        let resolved = definitions
            .into_iter()
            .map(|(instance, definition)| self.run(instance, definition, Pass::Commit))
            .collect::<Result<Vec<_>>>()?;

        info!(instances = resolved.len(), "Resolved addon variables");
        Ok(resolved)
    }

    /// Resolve one instance, generating secrets as needed
    pub fn resolve(
        &self,
        instance: &AddonInstance,
        definition: &AddonDefinition,
    ) -> Result<ResolvedVariables> {
        self.run(instance, definition, Pass::Check)?;
        self.run(instance, definition, Pass::Commit)
    }

    fn run(
        &self,
        instance: &AddonInstance,
        definition: &AddonDefinition,
        pass: Pass,
    ) -> Result<ResolvedVariables> {
        let variables = self.resolve_set(instance, definition, &definition.variables, pass)?;

        let readonly = if self.readonly_for.contains(&instance.key) {
            if definition.supports_readonly() {
                self.resolve_set(instance, definition, &definition.readonly_variables, pass)?
            } else {
                if pass == Pass::Commit {
                    warn!(
                        instance = %instance.key,
                        addon = %definition.name,
                        "Readonly access requested but addon has no readonly credentials"
                    );
                }
                Vec::new()
            }
        } else {
            Vec::new()
        };

        Ok(ResolvedVariables {
            instance: instance.key.clone(),
            variables,
            readonly,
        })
    }

    fn resolve_set(
        &self,
        instance: &AddonInstance,
        definition: &AddonDefinition,
        specs: &[VariableSpec],
        pass: Pass,
    ) -> Result<Vec<ResolvedVariable>> {
        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = substitute(&spec.name, &instance.key);
            let secret_key = spec
                .secret_key
                .as_deref()
                .map(|k| substitute(k, &instance.key));

            let (value, defaulted) = match self.lookup(spec, instance, definition) {
                Outcome::Value { value, defaulted } => (value, defaulted),
                Outcome::Generate { secret_key } => match pass {
                    // Placeholder; never leaves the check pass
                    Pass::Check => (String::new(), false),
                    Pass::Commit => {
                        let generated = self.generated.get_or_generate(&secret_key, generate_secret)?;
                        (generated.value, false)
                    }
                },
                Outcome::Absent if spec.required => {
                    return Err(Error::missing_variable(instance.key.to_string(), name));
                }
                Outcome::Absent => {
                    debug!(instance = %instance.key, variable = %name, "Optional variable has no value");
                    continue;
                }
            };

            debug!(
                instance = %instance.key,
                variable = %name,
                source = ?spec.source,
                defaulted,
                "Resolved variable"
            );
            resolved.push(ResolvedVariable {
                name,
                value,
                source: spec.source,
                is_secret: spec.is_secret,
                secret_key,
                export: spec.export.clone(),
                defaulted,
            });
        }
        Ok(resolved)
    }

    fn lookup(
        &self,
        spec: &VariableSpec,
        instance: &AddonInstance,
        definition: &AddonDefinition,
    ) -> Outcome {
        let key = &instance.key;
        let found = match spec.source {
            VariableSource::Secret => {
                let secret_key = spec.secret_key.as_deref().map(|k| substitute(k, key));
                match secret_key {
                    Some(secret_key) => match self.bundle.value(&secret_key) {
                        Some(value) => Some(value.to_string()),
                        None if spec.generate && spec.is_secret => {
                            return Outcome::Generate { secret_key };
                        }
                        None => None,
                    },
                    None => None,
                }
            }
            VariableSource::Config => spec
                .config_path
                .as_deref()
                .and_then(|path| self.tree.lookup(&substitute(path, key)).as_scalar_string()),
            VariableSource::Runtime => spec
                .fact
                .as_deref()
                .and_then(|fact| self.facts.fact(fact, instance, definition)),
            VariableSource::Literal => None,
        };

        // Blank counts as absent for every source
        match (found.filter(|v| !v.trim().is_empty()), &spec.default) {
            (Some(value), _) => Outcome::Value {
                value,
                defaulted: false,
            },
            (None, Some(default)) => Outcome::Value {
                value: default.clone(),
                defaulted: true,
            },
            (None, None) => Outcome::Absent,
        }
    }
}
