//! Encryption through the `age` command-line tool.

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::distribute::Encryptor;
use crate::error::{Error, Result};

/// Shells out to `age -r <recipient> -a`
#[derive(Debug, Clone)]
pub struct AgeCliEncryptor {
    binary: String,
}

impl Default for AgeCliEncryptor {
    fn default() -> Self {
        Self::new("age")
    }
}

impl AgeCliEncryptor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Encryptor for AgeCliEncryptor {
    async fn encrypt(&self, plaintext: &[u8], recipient: &str) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .arg("-r")
            .arg(recipient)
            .arg("-a")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.binary))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to open age stdin")?;
        let input = plaintext.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for age")?;
        writer
            .await
            .context("age stdin writer panicked")?
            .context("Failed to write plaintext to age")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::io(format!(
                "age exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8(output.stdout).context("age output is not valid UTF-8")?)
    }
}
