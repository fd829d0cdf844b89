//! Secret distributor
//!
//! Pushes the merged bundle to every target concurrently. A failed write
//! never stops other keys or targets; every failure is collected into the
//! [`DistributionReport`]. Each successful write is recorded in the
//! distribution ledger immediately, so an interrupted run resumes where it
//! stopped.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DistributionWriteError, Error, Result};
use crate::secrets::MergedBundle;

use super::filter::KeyFilter;
use super::ledger::{DistributionDocument, DistributionLedger, digest};
use super::report::{DistributionReport, TargetReport};
use super::target::{Delivery, DistributionTarget};
use super::traits::{Encryptor, PublicKeySource, SecretStoreClient};

/// A target paired with the client that writes to it
#[derive(Clone)]
pub struct TargetBinding {
    pub target: DistributionTarget,
    pub client: Arc<dyn SecretStoreClient>,
}

impl TargetBinding {
    pub fn new(target: DistributionTarget, client: Arc<dyn SecretStoreClient>) -> Self {
        Self { target, client }
    }
}

enum KeyOutcome {
    Written(String),
    Unchanged(String),
    Incomplete(String),
    Failed(DistributionWriteError),
}

pub struct SecretDistributor {
    encryptor: Arc<dyn Encryptor>,
    key_source: Option<Arc<dyn PublicKeySource>>,
    ledger: DistributionLedger,
}

impl SecretDistributor {
    pub fn new(encryptor: Arc<dyn Encryptor>, ledger: DistributionLedger) -> Self {
        Self {
            encryptor,
            key_source: None,
            ledger,
        }
    }

    pub fn with_key_source(mut self, source: Arc<dyn PublicKeySource>) -> Self {
        self.key_source = Some(source);
        self
    }

    /// Distribute `bundle` to every bound target
    ///
    /// Fails as a whole only when the public key is unavailable or the ledger
    /// cannot be read; write failures land in the report.
    pub async fn distribute(
        &self,
        bindings: &[TargetBinding],
        bundle: &MergedBundle,
        cancel: &CancellationToken,
    ) -> Result<DistributionReport> {
        let needs_key = bindings
            .iter()
            .any(|b| matches!(b.target.delivery, Delivery::Blob(_)));
        let public_key = if needs_key {
            Some(self.fetch_public_key().await?)
        } else {
            None
        };

        let doc = Mutex::new(self.ledger.load()?);

        let targets = join_all(bindings.iter().map(|binding| {
            self.run_target(binding, bundle, &doc, cancel, public_key.as_deref())
        }))
        .await;

        let report = DistributionReport {
            targets,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            targets = report.targets.len(),
            written = report.written_count(),
            failures = report.failures().len(),
            cancelled = report.cancelled,
            "Secret distribution finished"
        );
        Ok(report)
    }

    async fn fetch_public_key(&self) -> Result<String> {
        let source = self.key_source.as_ref().ok_or_else(|| {
            Error::EncryptionKeyUnavailable("no public key source is configured".to_string())
        })?;
        match source.fetch().await {
            Ok(Some(key)) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            Ok(_) => Err(Error::EncryptionKeyUnavailable(
                "execution host has not generated its key material yet".to_string(),
            )),
            Err(err) => Err(Error::EncryptionKeyUnavailable(format!(
                "failed to fetch public key: {}",
                err
            ))),
        }
    }

    async fn run_target(
        &self,
        binding: &TargetBinding,
        bundle: &MergedBundle,
        doc: &Mutex<DistributionDocument>,
        cancel: &CancellationToken,
        public_key: Option<&str>,
    ) -> TargetReport {
        let target = &binding.target;
        let filter = KeyFilter::for_target(target);
        let selected = bundle.select(|key| filter.allows(key));

        let mut report = TargetReport::new(&target.name, target.kind);
        report.skipped = selected.skipped().into_iter().map(String::from).collect();
        for key in &report.skipped {
            debug!(target = %target.name, key = %key, "Skipping blank secret");
        }

        match &target.delivery {
            Delivery::KeyValue => {
                let outcomes: Vec<KeyOutcome> = stream::iter(selected.distributable())
                    .map(|(key, value)| self.write_key(binding, key, value, doc, cancel))
                    .buffer_unordered(binding.client.parallelism().max(1))
                    .collect()
                    .await;
                for outcome in outcomes {
                    match outcome {
                        KeyOutcome::Written(key) => report.written.push(key),
                        KeyOutcome::Unchanged(key) => report.unchanged.push(key),
                        KeyOutcome::Incomplete(key) => report.incomplete.push(key),
                        KeyOutcome::Failed(err) => report.failures.push(err),
                    }
                }
            }
            Delivery::Blob(blob_name) => {
                if selected.distributable().next().is_none() {
                    debug!(target = %target.name, "No secrets to deliver");
                } else {
                    match public_key {
                        Some(recipient) => {
                            match self
                                .write_blob(binding, blob_name, &selected, recipient, doc, cancel)
                                .await
                            {
                                KeyOutcome::Written(k) => report.written.push(k),
                                KeyOutcome::Unchanged(k) => report.unchanged.push(k),
                                KeyOutcome::Incomplete(k) => report.incomplete.push(k),
                                KeyOutcome::Failed(err) => report.failures.push(err),
                            }
                        }
                        None => report.failures.push(DistributionWriteError {
                            target: target.name.clone(),
                            key: blob_name.clone(),
                            reason: "no public key available".to_string(),
                        }),
                    }
                }
            }
        }

        report.sort();
        info!(
            target = %target.name,
            kind = %target.kind,
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            incomplete = report.incomplete.len(),
            failures = report.failures.len(),
            "Target distribution finished"
        );
        report
    }

    async fn write_key(
        &self,
        binding: &TargetBinding,
        key: &str,
        value: &str,
        doc: &Mutex<DistributionDocument>,
        cancel: &CancellationToken,
    ) -> KeyOutcome {
        let target = &binding.target;
        if cancel.is_cancelled() {
            return KeyOutcome::Incomplete(key.to_string());
        }

        let target_key = target.idempotency_key();
        let value_digest = digest(value);

        let unchanged = if binding.client.supports_read() {
            match binding.client.read(target, key).await {
                Ok(current) => current.as_deref() == Some(value),
                Err(err) => {
                    debug!(target = %target.name, key = %key, error = %err, "Read-back failed, writing");
                    false
                }
            }
        } else {
            doc.lock().await.digest_of(&target_key, key) == Some(value_digest.as_str())
        };

        if unchanged {
            debug!(target = %target.name, key = %key, "Secret unchanged");
            self.record(doc, &target_key, key, value_digest).await;
            return KeyOutcome::Unchanged(key.to_string());
        }

        match binding.client.write(target, key, value).await {
            Ok(()) => {
                debug!(target = %target.name, key = %key, "Secret written");
                self.record(doc, &target_key, key, value_digest).await;
                KeyOutcome::Written(key.to_string())
            }
            Err(err) => KeyOutcome::Failed(DistributionWriteError {
                target: target.name.clone(),
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn write_blob(
        &self,
        binding: &TargetBinding,
        blob_name: &str,
        selected: &MergedBundle,
        recipient: &str,
        doc: &Mutex<DistributionDocument>,
        cancel: &CancellationToken,
    ) -> KeyOutcome {
        let target = &binding.target;
        let failed = |reason: String| {
            KeyOutcome::Failed(DistributionWriteError {
                target: target.name.clone(),
                key: blob_name.to_string(),
                reason,
            })
        };

        let payload = match serde_json::to_string(&selected.to_map()) {
            Ok(payload) => payload,
            Err(err) => return failed(format!("failed to serialize bundle: {}", err)),
        };
        let target_key = target.idempotency_key();
        let payload_digest = digest(&format!("{}\n{}", recipient, payload));

        // Ciphertext differs on every run, so the blob is current only when
        // both plaintext and recipient key match the last delivery.
        if doc.lock().await.digest_of(&target_key, blob_name) == Some(payload_digest.as_str()) {
            debug!(target = %target.name, blob = %blob_name, "Blob unchanged");
            return KeyOutcome::Unchanged(blob_name.to_string());
        }
        if cancel.is_cancelled() {
            return KeyOutcome::Incomplete(blob_name.to_string());
        }

        let ciphertext = match self.encryptor.encrypt(payload.as_bytes(), recipient).await {
            Ok(ciphertext) => ciphertext,
            Err(err) => return failed(format!("encryption failed: {}", err)),
        };
        match binding.client.write(target, blob_name, &ciphertext).await {
            Ok(()) => {
                self.record(doc, &target_key, blob_name, payload_digest).await;
                KeyOutcome::Written(blob_name.to_string())
            }
            Err(err) => failed(err.to_string()),
        }
    }

    async fn record(
        &self,
        doc: &Mutex<DistributionDocument>,
        target_key: &str,
        key: &str,
        value_digest: String,
    ) {
        let mut guard = doc.lock().await;
        if guard.digest_of(target_key, key) == Some(value_digest.as_str()) {
            return;
        }
        guard.record(target_key, key, value_digest);
        if let Err(err) = self.ledger.save(&guard) {
            warn!(target = %target_key, key = %key, error = %err, "Failed to update distribution ledger");
        }
    }
}
