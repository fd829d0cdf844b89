//! Addon catalog
//!
//! A closed registry of addon definitions, loaded once and never mutated.
//! Unknown type names surface as [`Error::UnknownAddon`].

pub mod schema;

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::variables::runtime::KNOWN_FACTS;

pub use schema::{AddonDefinition, HealthSpec, ResourcePlan, VariableSource, VariableSpec};

const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("forgejo", include_str!("builtin/forgejo.toml")),
    ("minio", include_str!("builtin/minio.toml")),
    ("mysql", include_str!("builtin/mysql.toml")),
    ("pgbouncer", include_str!("builtin/pgbouncer.toml")),
    ("postgres", include_str!("builtin/postgres.toml")),
    ("rabbitmq", include_str!("builtin/rabbitmq.toml")),
    ("redis", include_str!("builtin/redis.toml")),
    ("traefik", include_str!("builtin/traefik.toml")),
];

/// Immutable map of addon definitions keyed by type name
#[derive(Debug, Clone)]
pub struct AddonCatalog {
    definitions: BTreeMap<String, AddonDefinition>,
}

impl AddonCatalog {
    /// Load the definitions shipped with berth
    pub fn builtin() -> Result<Self> {
        let definitions = BUILTIN_DEFINITIONS
            .iter()
            .map(|(file, content)| {
                parse_definition(content).map_err(|e| match e {
                    Error::Serialization(msg) => {
                        Error::serialization(format!("builtin/{}.toml: {}", file, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_definitions(definitions)
    }

    /// Build a catalog from explicit definitions, validating every one
    pub fn from_definitions(definitions: Vec<AddonDefinition>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for def in definitions {
            if map.contains_key(&def.name) {
                return Err(Error::invalid_definition(
                    &def.name,
                    "defined more than once in the catalog",
                ));
            }
            map.insert(def.name.clone(), def);
        }

        let catalog = Self { definitions: map };
        for def in catalog.definitions.values() {
            catalog.validate_definition(def)?;
        }
        debug!(addons = catalog.definitions.len(), "Loaded addon catalog");
        Ok(catalog)
    }

    /// Look up a definition; `requested_by` names the referrer in the error
    pub fn get(&self, addon_type: &str, requested_by: &str) -> Result<&AddonDefinition> {
        self.definitions
            .get(addon_type)
            .ok_or_else(|| Error::UnknownAddon {
                addon_type: addon_type.to_string(),
                requested_by: requested_by.to_string(),
            })
    }

    pub fn contains(&self, addon_type: &str) -> bool {
        self.definitions.contains_key(addon_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(|k| k.as_str())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &AddonDefinition> {
        self.definitions.values()
    }

    /// Definitions that are force-included in every deployment
    pub fn required_infrastructure(&self) -> impl Iterator<Item = &AddonDefinition> {
        self.definitions
            .values()
            .filter(|def| def.required_infrastructure)
    }

    fn validate_definition(&self, def: &AddonDefinition) -> Result<()> {
        if def.requires.contains(&def.name) {
            return Err(Error::invalid_definition(&def.name, "requires itself"));
        }
        if def.conflicts.contains(&def.name) {
            return Err(Error::invalid_definition(&def.name, "conflicts with itself"));
        }
        for required in &def.requires {
            if !self.definitions.contains_key(required) {
                return Err(Error::invalid_definition(
                    &def.name,
                    format!("requires unknown addon '{}'", required),
                ));
            }
            if def.conflicts.contains(required) {
                return Err(Error::invalid_definition(
                    &def.name,
                    format!("both requires and conflicts with '{}'", required),
                ));
            }
        }
        if def.required_infrastructure && def.multi_instance {
            return Err(Error::invalid_definition(
                &def.name,
                "required infrastructure cannot be multi-instance",
            ));
        }

        for spec in def.variables.iter().chain(def.readonly_variables.iter()) {
            validate_variable(&def.name, spec)?;
        }
        Ok(())
    }
}

/// Parse one TOML addon definition
pub fn parse_definition(content: &str) -> Result<AddonDefinition> {
    toml::from_str(content).map_err(|e| Error::serialization(e.to_string()))
}

fn validate_variable(addon: &str, spec: &VariableSpec) -> Result<()> {
    let fail = |reason: String| Err(Error::invalid_definition(addon, reason));

    if spec.required && spec.default.is_some() {
        return fail(format!(
            "variable '{}' is required and must not declare a default",
            spec.name
        ));
    }
    if spec.generate && (spec.source != VariableSource::Secret || !spec.is_secret) {
        return fail(format!(
            "variable '{}' may only be generated when it is a secret-source secret",
            spec.name
        ));
    }
    match spec.source {
        VariableSource::Secret if spec.secret_key.is_none() => {
            fail(format!("secret variable '{}' has no secret_key", spec.name))
        }
        VariableSource::Config if spec.config_path.is_none() => {
            fail(format!("config variable '{}' has no config_path", spec.name))
        }
        VariableSource::Literal if spec.default.is_none() => {
            fail(format!("literal variable '{}' has no default", spec.name))
        }
        VariableSource::Runtime => match spec.fact.as_deref() {
            Some(fact) if KNOWN_FACTS.contains(&fact) => Ok(()),
            Some(fact) => fail(format!(
                "runtime variable '{}' uses unknown fact '{}'",
                spec.name, fact
            )),
            None => fail(format!("runtime variable '{}' has no fact", spec.name)),
        },
        _ => Ok(()),
    }
}
