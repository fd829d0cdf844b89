//! Record of what each target has already received
//!
//! Stores blake3 digests (never values) per target and key in
//! `<state_dir>/distribution.json`. Targets that cannot be read back rely on
//! it for idempotency, and an interrupted run resumes from it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::{read_json_or_default, write_json_atomic};

use super::target::DistributionTarget;

pub const DISTRIBUTION_FILE: &str = "distribution.json";
const LEDGER_VERSION: u32 = 1;

/// Digest of a secret value
pub fn digest(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDocument {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    /// Target idempotency key -> secret key -> digest
    #[serde(default)]
    pub targets: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for DistributionDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            targets: BTreeMap::new(),
        }
    }
}

impl DistributionDocument {
    pub fn digest_of(&self, target: &str, key: &str) -> Option<&str> {
        self.targets
            .get(target)
            .and_then(|keys| keys.get(key))
            .map(|d| d.as_str())
    }

    pub fn record(&mut self, target: &str, key: &str, digest: String) {
        self.targets
            .entry(target.to_string())
            .or_default()
            .insert(key.to_string(), digest);
        self.updated_at = Utc::now();
    }

    /// Drop everything recorded for a target, forcing a full rewrite
    pub fn forget(&mut self, target: &str) -> bool {
        self.targets.remove(target).is_some()
    }
}

/// Load/save service for the distribution ledger
#[derive(Debug, Clone)]
pub struct DistributionLedger {
    state_dir: PathBuf,
}

impl DistributionLedger {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(DISTRIBUTION_FILE)
    }

    pub fn load(&self) -> Result<DistributionDocument> {
        let doc: DistributionDocument = read_json_or_default(&self.path())?;
        if doc.version != LEDGER_VERSION {
            return Err(Error::serialization(format!(
                "{}: unsupported ledger version {}",
                self.path().display(),
                doc.version
            )));
        }
        Ok(doc)
    }

    /// Forget the given targets so the next run rewrites every key
    pub fn forget<'t>(
        &self,
        targets: impl IntoIterator<Item = &'t DistributionTarget>,
    ) -> Result<usize> {
        let mut doc = self.load()?;
        let mut forgotten = 0;
        for target in targets {
            if doc.forget(&target.idempotency_key()) {
                debug!(target = %target.name, "Forgot distribution record");
                forgotten += 1;
            }
        }
        if forgotten > 0 {
            self.save(&doc)?;
        }
        Ok(forgotten)
    }

    pub fn save(&self, doc: &DistributionDocument) -> Result<()> {
        Ok(write_json_atomic(&self.path(), doc)?)
    }
}
