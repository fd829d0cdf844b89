//! Persistence for the project-generated secret layer
//!
//! The layer is a flat JSON object in the project's state directory:
//! `<state_dir>/generated.json`. Every read-modify-write holds an exclusive
//! advisory lock on `<state_dir>/generated.lock`, so two resolutions that
//! race to generate the same key agree on one value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::fs::{FileLock, read_json_or_default, write_json_atomic};

use super::layer::{SecretLayer, SecretTier};

pub const GENERATED_FILE: &str = "generated.json";
pub const GENERATED_LOCK: &str = "generated.lock";

/// Outcome of [`GeneratedSecretStore::get_or_generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedValue {
    pub value: String,
    /// True when this call created the value
    pub created: bool,
}

/// Load/modify/save service for `generated.json`
#[derive(Debug, Clone)]
pub struct GeneratedSecretStore {
    state_dir: PathBuf,
}

impl GeneratedSecretStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(GENERATED_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(GENERATED_LOCK)
    }

    /// Current contents as a secret layer
    ///
    /// Writes are atomic renames, so reading without the lock never sees a
    /// torn document.
    pub fn load_layer(&self) -> Result<SecretLayer> {
        let entries = self.read()?;
        Ok(SecretLayer::with_entries(SecretTier::ProjectGenerated, entries))
    }

    /// Return the stored value for `key`, generating and persisting one if absent
    pub fn get_or_generate(
        &self,
        key: &str,
        generate: impl FnOnce() -> String,
    ) -> Result<GeneratedValue> {
        let _lock = FileLock::acquire(&self.lock_path())?;

        let mut entries = self.read()?;
        if let Some(existing) = entries.get(key).filter(|v| !v.trim().is_empty()) {
            debug!(key = %key, "Reusing generated secret");
            return Ok(GeneratedValue {
                value: existing.clone(),
                created: false,
            });
        }

        let value = generate();
        entries.insert(key.to_string(), value.clone());
        write_json_atomic(&self.path(), &entries)?;
        info!(key = %key, "Generated new secret");
        Ok(GeneratedValue {
            value,
            created: true,
        })
    }

    /// Remove a generated key; returns whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let _lock = FileLock::acquire(&self.lock_path())?;
        let mut entries = self.read()?;
        let existed = entries.remove(key).is_some();
        if existed {
            write_json_atomic(&self.path(), &entries)?;
        }
        Ok(existed)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        Ok(read_json_or_default(&self.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn generates_once_then_reuses() {
        let temp = TempDir::new().unwrap();
        let store = GeneratedSecretStore::new(temp.path().to_path_buf());

        let first = store
            .get_or_generate("DB_PASSWORD", || "first".to_string())
            .unwrap();
        let second = store
            .get_or_generate("DB_PASSWORD", || "second".to_string())
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.value, "first");
        assert_eq!(store.load_layer().unwrap().get("DB_PASSWORD"), Some("first"));
    }

    #[test]
    fn blank_stored_value_is_regenerated() {
        let temp = TempDir::new().unwrap();
        let store = GeneratedSecretStore::new(temp.path().to_path_buf());
        let mut seeded = BTreeMap::new();
        seeded.insert("TOKEN".to_string(), String::new());
        write_json_atomic(&store.path(), &seeded).unwrap();

        let value = store.get_or_generate("TOKEN", || "fresh".to_string()).unwrap();

        assert!(value.created);
        assert_eq!(value.value, "fresh");
    }

    #[test]
    fn remove_reports_existence() {
        let temp = TempDir::new().unwrap();
        let store = GeneratedSecretStore::new(temp.path().to_path_buf());
        store.get_or_generate("A", || "1".to_string()).unwrap();

        assert!(store.remove("A").unwrap());
        assert!(!store.remove("A").unwrap());
        assert!(store.load_layer().unwrap().is_empty());
    }

    #[test]
    fn concurrent_generation_agrees_on_one_value() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(GeneratedSecretStore::new(temp.path().to_path_buf()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .get_or_generate("SHARED", || format!("value-{}", i))
                        .unwrap()
                        .value
                })
            })
            .collect();

        let values: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.iter().all(|v| v == &values[0]));
    }
}
