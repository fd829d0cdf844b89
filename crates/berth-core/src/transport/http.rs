//! HTTP secret store client
//!
//! Secrets live at `{endpoint}/{scope}/{name}` and carry a JSON body
//! `{"value": "..."}`. `GET` answers 404 for absent secrets.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::distribute::{DistributionTarget, SecretStoreClient};
use crate::error::{Error, Result};

const DEFAULT_PARALLELISM: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct SecretBody {
    value: String,
}

#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    parallelism: usize,
}

impl HttpSecretStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("berth/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: None,
            parallelism: DEFAULT_PARALLELISM,
        })
    }

    /// Build a client from a target's `endpoint`
    pub fn for_target(target: &DistributionTarget) -> Result<Self> {
        let endpoint = target.endpoint.as_deref().ok_or_else(|| {
            Error::validation(format!(
                "distribution target '{}' has no endpoint",
                target.name
            ))
        })?;
        Self::new(endpoint)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn secret_url(&self, target: &DistributionTarget, name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, target.scope.path_segment(), name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SecretStoreClient for HttpSecretStore {
    fn supports_read(&self) -> bool {
        true
    }

    fn parallelism(&self) -> usize {
        self.parallelism
    }

    async fn read(&self, target: &DistributionTarget, name: &str) -> Result<Option<String>> {
        let url = self.secret_url(target, name);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::io(format!("HTTP {} from {}", response.status(), url)));
        }
        let body: SecretBody = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok(Some(body.value))
    }

    async fn write(&self, target: &DistributionTarget, name: &str, value: &str) -> Result<()> {
        let url = self.secret_url(target, name);
        let response = self
            .authorize(self.client.put(&url))
            .json(&SecretBody {
                value: value.to_string(),
            })
            .send()
            .await
            .with_context(|| format!("Failed to send {}", url))?;

        if !response.status().is_success() {
            return Err(Error::io(format!("HTTP {} from {}", response.status(), url)));
        }
        Ok(())
    }
}
