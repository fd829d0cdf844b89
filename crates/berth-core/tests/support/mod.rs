#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use berth_core::context::AppContext;
use berth_core::distribute::{DistributionTarget, Encryptor, PublicKeySource, SecretStoreClient};
use berth_core::{Error, Result};
use tempfile::TempDir;

/// Project root and state directory inside one temp dir
pub fn project(temp: &TempDir, berth_toml: &str) -> AppContext {
    let root = temp.path().join("project");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("berth.toml"), berth_toml).unwrap();
    AppContext::new(root, temp.path().join("state"))
}

pub fn write_infrastructure(ctx: &AppContext, content: &str) {
    write_file(&ctx.project_root().join(".berth/infrastructure.toml"), content);
}

pub fn write_override(ctx: &AppContext, name: &str, content: &str) {
    write_file(&ctx.project_root().join(".berth/overrides").join(name), content);
}

fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Wraps the plaintext so tests can see what was encrypted for whom
#[derive(Default)]
pub struct FakeEncryptor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Encryptor for FakeEncryptor {
    async fn encrypt(&self, plaintext: &[u8], recipient: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "enc[{}]:{}",
            recipient,
            String::from_utf8_lossy(plaintext)
        ))
    }
}

pub struct FakeKeySource {
    key: Option<String>,
}

impl FakeKeySource {
    pub fn ready(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
        }
    }

    pub fn not_ready() -> Self {
        Self { key: None }
    }
}

#[async_trait]
impl PublicKeySource for FakeKeySource {
    async fn fetch(&self) -> Result<Option<String>> {
        Ok(self.key.clone())
    }
}

/// In-memory secret store with optional failures
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
    failing_keys: BTreeSet<String>,
    fail_all: bool,
    readable: bool,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that can report current values back
    pub fn readable() -> Self {
        Self {
            readable: true,
            ..Self::default()
        }
    }

    /// Store whose every write fails
    pub fn broken() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_on(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn seed(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.lock().unwrap().keys().cloned().collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStoreClient for MemoryStore {
    fn supports_read(&self) -> bool {
        self.readable
    }

    fn parallelism(&self) -> usize {
        4
    }

    async fn read(&self, _target: &DistributionTarget, name: &str) -> Result<Option<String>> {
        Ok(self.get(name))
    }

    async fn write(&self, target: &DistributionTarget, name: &str, value: &str) -> Result<()> {
        if self.fail_all || self.failing_keys.contains(name) {
            return Err(Error::io(format!(
                "{} rejected {}: 503 Service Unavailable",
                target.name, name
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(name, value);
        Ok(())
    }
}
