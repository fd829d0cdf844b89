//! Secret layer merging logic
//!
//! Implements the 3-layer merge strategy:
//! Infrastructure -> ProjectGenerated -> Override
//!
//! The merge is key-granular: a key from a higher tier replaces only that
//! key, everything else from lower tiers survives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::layer::{SecretLayer, SecretStack, SecretTier};

/// One merged key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEntry {
    pub value: String,
    /// Tier the winning value came from
    pub tier: SecretTier,
    /// Blank values are reported but never distributed
    pub skip: bool,
}

/// Flat merged secret bundle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergedBundle {
    entries: BTreeMap<String, MergedEntry>,
}

impl MergedBundle {
    pub fn entries(&self) -> &BTreeMap<String, MergedEntry> {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&MergedEntry> {
        self.entries.get(key)
    }

    /// Usable value for a key; blank values count as absent
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|e| !e.skip)
            .map(|e| e.value.as_str())
    }

    /// Keys that will be written
    pub fn distributable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.skip)
            .map(|(k, e)| (k.as_str(), e.value.as_str()))
    }

    /// Keys intentionally omitted from distribution
    pub fn skipped(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.skip)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Restrict the bundle to keys accepted by `allow`
    pub fn select(&self, allow: impl Fn(&str) -> bool) -> MergedBundle {
        MergedBundle {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| allow(k))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    /// Plain key/value map of distributable entries
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.distributable()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merge layers by tier rank, independent of argument order.
///
/// Layers of the same tier are applied in the order given.
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a SecretLayer>) -> MergedBundle {
    let mut ordered: Vec<&SecretLayer> = layers.into_iter().collect();
    ordered.sort_by_key(|layer| layer.tier.rank());

    let mut entries = BTreeMap::new();
    for layer in ordered {
        for (key, value) in &layer.entries {
            entries.insert(
                key.clone(),
                MergedEntry {
                    value: value.clone(),
                    tier: layer.tier,
                    skip: value.trim().is_empty(),
                },
            );
        }
    }

    let merged = MergedBundle { entries };
    debug!(
        keys = merged.len(),
        skipped = merged.skipped().len(),
        "Merged secret layers"
    );
    merged
}

impl SecretStack {
    /// Merge this project's three layers
    pub fn merged(&self) -> MergedBundle {
        merge_layers(self.layers())
    }
}
