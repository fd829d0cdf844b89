//! Secret layers: prioritized tiers of key/value pairs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority tier of a secret layer, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretTier {
    /// Shared infrastructure secrets
    Infrastructure,
    /// Secrets generated and persisted per project
    ProjectGenerated,
    /// User-supplied ad-hoc override files
    Override,
}

impl SecretTier {
    /// Higher rank wins on key collisions
    pub fn rank(self) -> u8 {
        match self {
            SecretTier::Infrastructure => 0,
            SecretTier::ProjectGenerated => 1,
            SecretTier::Override => 2,
        }
    }
}

impl fmt::Display for SecretTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecretTier::Infrastructure => "infrastructure",
            SecretTier::ProjectGenerated => "project-generated",
            SecretTier::Override => "override",
        };
        f.write_str(name)
    }
}

/// One tier of secret values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretLayer {
    pub tier: SecretTier,
    pub entries: BTreeMap<String, String>,
}

impl SecretLayer {
    pub fn new(tier: SecretTier) -> Self {
        Self {
            tier,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_entries<I, K, V>(tier: SecretTier, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tier,
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three layers of one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretStack {
    pub infrastructure: SecretLayer,
    pub generated: SecretLayer,
    pub overrides: SecretLayer,
}

impl SecretStack {
    pub fn new(infrastructure: SecretLayer, generated: SecretLayer, overrides: SecretLayer) -> Self {
        Self {
            infrastructure,
            generated,
            overrides,
        }
    }

    pub fn empty() -> Self {
        Self::new(
            SecretLayer::new(SecretTier::Infrastructure),
            SecretLayer::new(SecretTier::ProjectGenerated),
            SecretLayer::new(SecretTier::Override),
        )
    }

    pub fn layers(&self) -> [&SecretLayer; 3] {
        [&self.infrastructure, &self.generated, &self.overrides]
    }
}
