//! Persistent record of instance lifecycle states
//!
//! Stored as `<state_dir>/instances.json`. Instances that were deployed and
//! are no longer configured are reported as orphans, even when a later
//! resolution moved them back to `resolved`; they are only removed by an
//! explicit teardown.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fs::{read_json_or_default, write_json_atomic};
use crate::resolve::DeploymentPlan;
use crate::types::InstanceRef;

use super::state::InstanceState;

pub const LEDGER_FILE: &str = "instances.json";
const LEDGER_VERSION: u32 = 1;

/// Ledger entry of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub addon_type: String,
    pub state: InstanceState,
    pub updated_at: DateTime<Utc>,
    /// Last deployment; cleared by teardown
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Running on the execution host until explicitly torn down
    pub fn is_live(&self) -> bool {
        self.state != InstanceState::Removed && self.deployed_at.is_some()
    }
}

/// On-disk ledger document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleDocument {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub instances: BTreeMap<InstanceRef, InstanceRecord>,
}

impl Default for LifecycleDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            instances: BTreeMap::new(),
        }
    }
}

impl LifecycleDocument {
    pub fn state(&self, key: &InstanceRef) -> Option<InstanceState> {
        self.instances.get(key).map(|r| r.state)
    }

    /// Apply one transition; unknown instances start as `declared`
    pub fn transition(
        &mut self,
        key: &InstanceRef,
        addon_type: &str,
        next: InstanceState,
    ) -> Result<()> {
        let now = Utc::now();
        let current = self.state(key).unwrap_or(InstanceState::Declared);
        let next = current.transition(key, next)?;

        let record = self
            .instances
            .entry(key.clone())
            .or_insert_with(|| InstanceRecord {
                addon_type: addon_type.to_string(),
                state: InstanceState::Declared,
                updated_at: now,
                deployed_at: None,
            });
        record.addon_type = addon_type.to_string();
        record.state = next;
        record.updated_at = now;
        match next {
            InstanceState::Deployed => record.deployed_at = Some(now),
            InstanceState::Removed => record.deployed_at = None,
            _ => {}
        }
        self.updated_at = now;
        debug!(instance = %key, from = %current, to = %next, "Instance state changed");
        Ok(())
    }

    /// Live instances that are absent from `configured`
    pub fn orphans(&self, configured: &BTreeSet<InstanceRef>) -> Vec<InstanceRef> {
        self.instances
            .iter()
            .filter(|(key, record)| record.is_live() && !configured.contains(*key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Load/modify/save service for the lifecycle ledger
#[derive(Debug, Clone)]
pub struct LifecycleLedger {
    state_dir: PathBuf,
}

impl LifecycleLedger {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(LEDGER_FILE)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn load(&self) -> Result<LifecycleDocument> {
        let doc: LifecycleDocument = read_json_or_default(&self.path())?;
        if doc.version != LEDGER_VERSION {
            return Err(Error::serialization(format!(
                "{}: unsupported ledger version {}",
                self.path().display(),
                doc.version
            )));
        }
        Ok(doc)
    }

    pub fn save(&self, doc: &LifecycleDocument) -> Result<()> {
        Ok(write_json_atomic(&self.path(), doc)?)
    }

    /// Move every planned instance to `state`
    ///
    /// Removed instances that reappear in the plan re-enter through `declared`.
    pub fn advance_plan(&self, plan: &DeploymentPlan, state: InstanceState) -> Result<()> {
        let mut doc = self.load()?;
        for instance in plan.instances() {
            if doc.state(&instance.key) == Some(InstanceState::Removed) {
                doc.transition(&instance.key, &instance.addon_type, InstanceState::Declared)?;
            }
            doc.transition(&instance.key, &instance.addon_type, state)?;
        }
        self.save(&doc)
    }

    /// Record a successful deployment of the given instances
    pub fn mark_deployed(&self, keys: &[InstanceRef]) -> Result<()> {
        let mut doc = self.load()?;
        for key in keys {
            let addon_type = doc
                .instances
                .get(key)
                .map(|r| r.addon_type.clone())
                .ok_or_else(|| {
                    Error::validation(format!("addon instance '{}' has never been resolved", key))
                })?;
            doc.transition(key, &addon_type, InstanceState::Deployed)?;
        }
        self.save(&doc)?;
        info!(instances = keys.len(), "Marked instances deployed");
        Ok(())
    }

    /// Explicitly tear down an instance that is no longer configured
    pub fn teardown(&self, key: &InstanceRef, configured: &BTreeSet<InstanceRef>) -> Result<()> {
        if configured.contains(key) {
            return Err(Error::validation(format!(
                "addon instance '{}' is still declared in configuration; remove it first",
                key
            )));
        }
        let mut doc = self.load()?;
        let addon_type = doc
            .instances
            .get(key)
            .map(|r| r.addon_type.clone())
            .ok_or_else(|| Error::validation(format!("unknown addon instance '{}'", key)))?;
        doc.transition(key, &addon_type, InstanceState::Removed)?;
        self.save(&doc)?;
        info!(instance = %key, "Instance torn down");
        Ok(())
    }

    /// Deployed instances no longer in configuration; logged, never removed
    pub fn orphans(&self, configured: &BTreeSet<InstanceRef>) -> Result<Vec<InstanceRef>> {
        let orphans = self.load()?.orphans(configured);
        for key in &orphans {
            warn!(instance = %key, "Deployed instance is no longer configured; run teardown to remove it");
        }
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(s: &str) -> InstanceRef {
        s.parse().unwrap()
    }

    #[test]
    fn transitions_persist() {
        let temp = TempDir::new().unwrap();
        let ledger = LifecycleLedger::new(temp.path().to_path_buf());
        let mut doc = ledger.load().unwrap();
        doc.transition(&key("databases.primary"), "postgres", InstanceState::Resolving)
            .unwrap();
        doc.transition(&key("databases.primary"), "postgres", InstanceState::Resolved)
            .unwrap();
        ledger.save(&doc).unwrap();

        ledger.mark_deployed(&[key("databases.primary")]).unwrap();

        let doc = ledger.load().unwrap();
        let record = &doc.instances[&key("databases.primary")];
        assert_eq!(record.state, InstanceState::Deployed);
        assert!(record.deployed_at.is_some());
    }

    #[test]
    fn orphans_and_teardown() {
        let temp = TempDir::new().unwrap();
        let ledger = LifecycleLedger::new(temp.path().to_path_buf());
        let mut doc = ledger.load().unwrap();
        for state in [
            InstanceState::Resolving,
            InstanceState::Resolved,
            InstanceState::Deployed,
        ] {
            doc.transition(&key("caches.old"), "redis", state).unwrap();
        }
        ledger.save(&doc).unwrap();

        let configured = BTreeSet::new();
        assert_eq!(ledger.orphans(&configured).unwrap(), vec![key("caches.old")]);

        ledger.teardown(&key("caches.old"), &configured).unwrap();
        assert!(ledger.orphans(&configured).unwrap().is_empty());
        assert_eq!(
            ledger.load().unwrap().state(&key("caches.old")),
            Some(InstanceState::Removed)
        );
    }

    #[test]
    fn re_resolved_deployment_stays_tracked() {
        let temp = TempDir::new().unwrap();
        let ledger = LifecycleLedger::new(temp.path().to_path_buf());
        let mut doc = ledger.load().unwrap();
        for state in [
            InstanceState::Resolving,
            InstanceState::Resolved,
            InstanceState::Deployed,
            InstanceState::Resolving,
            InstanceState::Resolved,
        ] {
            doc.transition(&key("caches.old"), "redis", state).unwrap();
        }
        doc.transition(&key("caches.fresh"), "redis", InstanceState::Resolving)
            .unwrap();
        ledger.save(&doc).unwrap();

        let configured = BTreeSet::new();
        assert_eq!(ledger.orphans(&configured).unwrap(), vec![key("caches.old")]);

        ledger.teardown(&key("caches.old"), &configured).unwrap();
        let doc = ledger.load().unwrap();
        assert!(doc.instances[&key("caches.old")].deployed_at.is_none());
        assert!(doc.orphans(&configured).is_empty());
    }

    #[test]
    fn teardown_refuses_configured_instance() {
        let temp = TempDir::new().unwrap();
        let ledger = LifecycleLedger::new(temp.path().to_path_buf());
        let configured: BTreeSet<_> = [key("caches.main")].into_iter().collect();

        let err = ledger.teardown(&key("caches.main"), &configured).unwrap_err();
        assert!(err.to_string().contains("still declared"));
    }

    #[test]
    fn removed_instance_cannot_be_marked_deployed() {
        let temp = TempDir::new().unwrap();
        let ledger = LifecycleLedger::new(temp.path().to_path_buf());
        let mut doc = ledger.load().unwrap();
        doc.transition(&key("caches.old"), "redis", InstanceState::Removed)
            .unwrap();
        ledger.save(&doc).unwrap();

        let err = ledger.mark_deployed(&[key("caches.old")]).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }
}
