//! Control-plane HTTP client: `SignalSource` and `Authenticator` adapters.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docp_common::TransactionStatus;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::application::ports::{Authenticator, ConfigStore, HttpReply, STATUS_OK, SignalSource};
use crate::domain::TransportError;

pub const SIGNAL_TIMEOUT: Duration = Duration::from_secs(60);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(90);

const SIGNAL_PATH: &str = "/compute/v1/status/info";
const TRANSACTION_PATH: &str = "/compute/transaction";
const TOKEN_PATH: &str = "/agents/auth/api_key/token";
const API_KEY_HEADER: &str = "docp-api-key";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
    compute_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct ControlPlaneClient {
    client: Client,
    domain: String,
    config: Arc<dyn ConfigStore>,
}

impl ControlPlaneClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(domain: impl Into<String>, config: Arc<dyn ConfigStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(SIGNAL_TIMEOUT)
            .build()
            .context("building control plane HTTP client")?;
        Ok(Self {
            client,
            domain: domain.into().trim_end_matches('/').to_string(),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.domain)
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.config.load().await?.access_token)
    }
}

async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .context("reading control plane response")?;
    Ok(HttpReply::new(status, body.to_vec()))
}

#[async_trait]
impl SignalSource for ControlPlaneClient {
    async fn fetch_signal(&self) -> Result<HttpReply> {
        let response = self
            .client
            .get(self.url(SIGNAL_PATH))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("requesting signal")?;
        into_reply(response).await
    }

    async fn post_status(&self, status: &TransactionStatus) -> Result<HttpReply> {
        tracing::debug!(transaction = %status.id, phase = %status.status, "posting status");
        let response = self
            .client
            .post(self.url(TRANSACTION_PATH))
            .bearer_auth(self.bearer().await?)
            .timeout(STATUS_TIMEOUT)
            .json(status)
            .send()
            .await
            .context("posting transaction status")?;
        into_reply(response).await
    }
}

#[async_trait]
impl Authenticator for ControlPlaneClient {
    async fn reauthenticate(&self) -> Result<()> {
        let config = self.config.load().await?;
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .header(API_KEY_HEADER, &config.agent.api_key)
            .json(&TokenRequest {
                api_key: &config.agent.api_key,
                compute_id: &config.compute_id,
            })
            .send()
            .await
            .context("requesting access token")?;

        let status = response.status().as_u16();
        if status != STATUS_OK {
            return Err(TransportError::AuthFailed(status).into());
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("decoding access token response")?;
        self.config
            .modify(&mut |c| c.access_token.clone_from(&token.access_token))
            .await?;
        tracing::info!("access token refreshed");
        Ok(())
    }
}
