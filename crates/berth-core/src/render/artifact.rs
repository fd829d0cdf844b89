//! Serializable deployment artifact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attach::AppEnvironment;
use crate::catalog::{HealthSpec, ResourcePlan};
use crate::error::{Error, Result};
use crate::instance::InstanceOrigin;
use crate::types::InstanceRef;

/// One instance ready for template injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedInstance {
    pub key: InstanceRef,
    pub addon_type: String,
    pub version: Option<String>,
    pub container_name: String,
    pub hostname: String,
    pub ports: BTreeMap<String, u16>,
    pub plan: String,
    pub resources: ResourcePlan,
    /// Container environment, secret values included
    pub env: BTreeMap<String, String>,
    /// Names in `env` that carry secret values
    pub secret_names: Vec<String>,
    /// Secret keys the instance consumes
    pub secret_keys: Vec<String>,
    pub healthcheck: Option<HealthSpec>,
    pub dependencies: Vec<InstanceRef>,
    pub origin: InstanceOrigin,
}

/// Everything the provisioning steps need for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedDeployment {
    pub project: String,
    pub generated_at: DateTime<Utc>,
    /// Deployment order
    pub instances: Vec<RenderedInstance>,
    pub apps: Vec<AppEnvironment>,
}

impl RenderedDeployment {
    pub fn instance(&self, key: &InstanceRef) -> Option<&RenderedInstance> {
        self.instances.iter().find(|i| &i.key == key)
    }

    pub fn app(&self, name: &str) -> Option<&AppEnvironment> {
        self.apps.iter().find(|a| a.app == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Same artifact with every secret value replaced by `***`
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for instance in &mut copy.instances {
            for name in &instance.secret_names {
                if let Some(value) = instance.env.get_mut(name) {
                    *value = REDACTED.to_string();
                }
            }
        }
        for app in &mut copy.apps {
            for name in &app.secret_names {
                if let Some(value) = app.env.get_mut(name) {
                    *value = REDACTED.to_string();
                }
            }
        }
        copy
    }
}

const REDACTED: &str = "***";
