//! Public key retrieval through a configured command.

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::distribute::PublicKeySource;
use crate::error::{Error, Result};

/// Runs a command whose stdout is the execution host's public key
#[derive(Debug, Clone)]
pub struct CommandKeySource {
    command: Vec<String>,
}

impl CommandKeySource {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::validation("public key command must not be empty"));
        }
        Ok(Self { command })
    }
}

#[async_trait]
impl PublicKeySource for CommandKeySource {
    async fn fetch(&self) -> Result<Option<String>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::validation("public key command must not be empty"))?;
        debug!(program = %program, "Fetching execution host public key");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::io(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        let key = String::from_utf8(output.stdout).context("Public key is not valid UTF-8")?;
        let key = key.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_becomes_key() {
        let source = CommandKeySource::new(vec![
            "echo".to_string(),
            "age1examplekey".to_string(),
        ])
        .unwrap();
        assert_eq!(source.fetch().await.unwrap().as_deref(), Some("age1examplekey"));
    }

    #[tokio::test]
    async fn empty_output_means_not_ready() {
        let source = CommandKeySource::new(vec!["true".to_string()]).unwrap();
        assert_eq!(source.fetch().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_command_is_error() {
        let source = CommandKeySource::new(vec!["false".to_string()]).unwrap();
        assert!(source.fetch().await.is_err());
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandKeySource::new(Vec::new()).is_err());
    }
}
