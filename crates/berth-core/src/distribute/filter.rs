//! Per-target key filtering.

use super::target::DistributionTarget;

/// Policy for determining which keys a target receives.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    /// Whitelist: only these key prefixes (if Some)
    keys: Option<Vec<String>>,
    /// Blacklist: skip these key prefixes (if Some, and keys is None)
    ignore_keys: Option<Vec<String>>,
}

impl KeyFilter {
    pub fn new(keys: Option<Vec<String>>, ignore_keys: Option<Vec<String>>) -> Self {
        Self { keys, ignore_keys }
    }

    pub fn for_target(target: &DistributionTarget) -> Self {
        Self::new(target.keys.clone(), target.ignore_keys.clone())
    }

    /// Check if the key should be written to the target.
    pub fn allows(&self, key: &str) -> bool {
        if let Some(ref whitelist) = self.keys {
            return whitelist.iter().any(|prefix| key.starts_with(prefix.as_str()));
        }
        if let Some(ref blacklist) = self.ignore_keys {
            return !blacklist.iter().any(|prefix| key.starts_with(prefix.as_str()));
        }
        true
    }
}
