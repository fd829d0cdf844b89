//! Capability seams of the distributor
//!
//! The engine never talks to a CLI or network library directly; transports
//! in [`crate::transport`] implement these traits and tests substitute fakes.

use async_trait::async_trait;

use crate::error::Result;

use super::target::DistributionTarget;

/// Asymmetric encryption of a payload for one recipient
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `plaintext` for `recipient`, returning an ASCII-armored blob
    async fn encrypt(&self, plaintext: &[u8], recipient: &str) -> Result<String>;
}

/// Source of the execution host's current public key
#[async_trait]
pub trait PublicKeySource: Send + Sync {
    /// `Ok(None)` means the host has not generated key material yet
    async fn fetch(&self) -> Result<Option<String>>;
}

/// A remote secret store
#[async_trait]
pub trait SecretStoreClient: Send + Sync {
    /// Whether [`read`](Self::read) returns current values
    fn supports_read(&self) -> bool {
        false
    }

    /// Maximum concurrent writes against this store
    fn parallelism(&self) -> usize {
        1
    }

    /// Current value of a secret, `None` when absent
    async fn read(&self, _target: &DistributionTarget, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Set a secret by name within the target's scope
    async fn write(&self, target: &DistributionTarget, name: &str, value: &str) -> Result<()>;
}
