//! Client for the core agent's loopback HTTP API.
//!
//! Privileged vendor operations are delegated to the core agent, which runs
//! with the rights to install packages. Every reply carries a
//! `{status, code, message}` envelope.

use std::time::Duration;

use anyhow::{Context, Result};
use docp_common::ConfigFile;
use docp_common::action::{Component, EnvVar, Mode};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::TransportError;

pub const LOCAL_API_TIMEOUT: Duration = Duration::from_secs(30);

const HEALTH_OK: &str = "HEALTH_OK";

/// Reply envelope of every local endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LocalReply {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl LocalReply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_str(), "success" | "accepted")
    }
}

/// Body of `/datadog/install` and `/datadog/tracer/install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRequest {
    pub dd_site: String,
    pub dd_api_key: String,
    pub mode: Mode,
    pub component: Component,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,
}

#[derive(Debug, Serialize)]
struct VersionRequest<'a> {
    version: &'a str,
}

pub struct LocalAgentClient {
    client: Client,
    base: String,
}

impl LocalAgentClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(LOCAL_API_TIMEOUT)
            .build()
            .context("building local agent HTTP client")?;
        Ok(Self {
            client,
            base: format!("http://127.0.0.1:{port}"),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the API is unreachable or not healthy.
    pub async fn health(&self) -> Result<()> {
        let reply: LocalReply = self
            .client
            .get(format!("{}/health", self.base))
            .send()
            .await
            .context("reaching local agent API")?
            .json()
            .await
            .context("decoding local agent health")?;
        if reply.is_success() && reply.code == HEALTH_OK {
            return Ok(());
        }
        Err(TransportError::Rejected {
            endpoint: "/health".to_string(),
            code: reply.code,
            message: reply.message,
        }
        .into())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the agent rejects it.
    pub async fn install(&self, request: &InstallRequest) -> Result<LocalReply> {
        self.post("/datadog/install", Some(request)).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the agent rejects it.
    pub async fn install_tracer(&self, request: &InstallRequest) -> Result<LocalReply> {
        self.post("/datadog/tracer/install", Some(request)).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the agent rejects it.
    pub async fn uninstall(&self) -> Result<LocalReply> {
        self.post::<()>("/datadog/uninstall", None).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the agent rejects it.
    pub async fn apply_configuration(&self, file: &ConfigFile) -> Result<LocalReply> {
        self.post("/datadog/configurations", Some(file)).await
    }

    /// Ask the agent to refresh its package index ahead of a version change.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the agent rejects it.
    pub async fn prepare_version_update(&self, version: &str) -> Result<LocalReply> {
        self.post("/datadog/update/version", Some(&VersionRequest { version }))
            .await
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: Option<&T>) -> Result<LocalReply> {
        let mut request = self.client.post(format!("{}{endpoint}", self.base));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("calling local agent {endpoint}"))?;
        let status = response.status().as_u16();
        let reply: LocalReply = response
            .json()
            .await
            .with_context(|| format!("decoding local agent reply from {endpoint} ({status})"))?;
        if !reply.is_success() {
            return Err(TransportError::Rejected {
                endpoint: endpoint.to_string(),
                code: reply.code,
                message: reply.message,
            }
            .into());
        }
        tracing::debug!(endpoint, code = %reply.code, "local agent accepted request");
        Ok(reply)
    }
}
