//! Ordered deployment plan produced by the dependency resolver.

use serde::{Deserialize, Serialize};

use crate::instance::AddonInstance;
use crate::types::InstanceRef;

/// One instance in deployment order, with the instances it depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedInstance {
    pub instance: AddonInstance,
    pub dependencies: Vec<InstanceRef>,
}

/// Instances in topological order: dependencies before dependents,
/// independent instances in lexical `category.instance` order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentPlan {
    entries: Vec<PlannedInstance>,
}

impl DeploymentPlan {
    pub(crate) fn new(entries: Vec<PlannedInstance>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlannedInstance] {
        &self.entries
    }

    pub fn instances(&self) -> impl Iterator<Item = &AddonInstance> {
        self.entries.iter().map(|e| &e.instance)
    }

    /// Instance keys in deployment order
    pub fn order(&self) -> Vec<InstanceRef> {
        self.entries.iter().map(|e| e.instance.key.clone()).collect()
    }

    pub fn get(&self, key: &InstanceRef) -> Option<&AddonInstance> {
        self.instances().find(|i| &i.key == key)
    }

    pub fn contains(&self, key: &InstanceRef) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
