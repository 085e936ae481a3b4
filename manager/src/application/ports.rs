//! Port trait definitions for the Application layer.
//!
//! Ports are the capabilities the reconciliation core consumes. This file
//! imports only from `crate::domain` and the shared wire types, never from
//! `crate::infra`. Every port is object safe and injected as `Arc<dyn _>`.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use docp_common::{AgentConfig, ConfigFile, TransactionStatus};

use crate::domain::actions::{SingleStepEnv, TracingLibraryEnv};
use crate::domain::{Service, ServiceStatus};

// ── Value Types ───────────────────────────────────────────────────────────────

pub const STATUS_OK: u16 = 200;
pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_FORBIDDEN: u16 = 403;

/// Raw reply of a control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// The two persisted signal blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    /// Latest signal fetched from the control plane.
    Received,
    /// Last signal whose convergence was confirmed.
    Current,
}

impl StateSlot {
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Current => "current",
        }
    }
}

// ── Control Plane Ports ───────────────────────────────────────────────────────

/// Signal retrieval and status reporting.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Fetch the desired state for this host.
    async fn fetch_signal(&self) -> Result<HttpReply>;
    /// Post one transaction status report.
    async fn post_status(&self, status: &TransactionStatus) -> Result<HttpReply>;
}

/// Bearer-token refresh.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a fresh access token and persist it to the agent config.
    async fn reauthenticate(&self) -> Result<()>;
}

// ── Host Service Ports ────────────────────────────────────────────────────────

/// Service-manager primitives, one implementation per OS.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn status(&self, service: Service) -> Result<ServiceStatus>;
    async fn already_installed(&self, service: Service) -> Result<bool>;
    async fn restart(&self, service: Service) -> Result<()>;
    async fn stop(&self, service: Service) -> Result<()>;
    async fn daemon_reload(&self) -> Result<()>;
}

/// Install mechanics of the core agent binary.
#[async_trait]
pub trait AgentLifecycle: Send + Sync {
    async fn install(&self, version: &str) -> Result<()>;
    async fn uninstall(&self, version: &str) -> Result<()>;
    /// Launch the updater process, which performs its own health poll and
    /// rollback using `rollback_version` from the agent config.
    async fn update(&self, version: &str) -> Result<()>;
    /// Remove the agent, the updater and finally the manager itself.
    async fn auto_uninstall(&self, version: &str) -> Result<()>;
    /// Newest published agent release.
    async fn latest_version(&self) -> Result<String>;
}

/// Monitoring vendor operations.
#[async_trait]
pub trait VendorLifecycle: Send + Sync {
    async fn install_agent(&self, site: &str, api_key: &str) -> Result<()>;
    async fn install_apm_single_step(&self, env: &SingleStepEnv) -> Result<()>;
    async fn install_apm_tracing_library(&self, env: &TracingLibraryEnv) -> Result<()>;
    async fn uninstall_agent(&self) -> Result<()>;
    /// Back up the current file and write the new content.
    async fn apply_configuration(&self, file: &ConfigFile) -> Result<()>;
    /// Refresh the local package index.
    async fn update_repository(&self) -> Result<()>;
    async fn update_version(&self, version: &str) -> Result<()>;
    async fn rollback_version(&self, version: &str) -> Result<()>;
    /// Installed vendor agent version.
    async fn version(&self) -> Result<String>;
    /// Newest vendor agent version available in the package index.
    async fn latest_version(&self) -> Result<String>;
}

// ── Persistence Ports ─────────────────────────────────────────────────────────

/// Agent config file access. Read on every call, never cached.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<AgentConfig>;
    async fn save(&self, config: &AgentConfig) -> Result<()>;

    /// Read-modify-write, returning the saved config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or saved.
    async fn modify(
        &self,
        mutate: &mut (dyn for<'c> FnMut(&'c mut AgentConfig) + Send),
    ) -> Result<AgentConfig> {
        let mut config = self.load().await?;
        mutate(&mut config);
        self.save(&config).await?;
        Ok(config)
    }
}

/// Persisted signal blobs.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when the slot has never been written.
    async fn load(&self, slot: StateSlot) -> Result<Option<Vec<u8>>>;
    async fn save(&self, slot: StateSlot, bytes: &[u8]) -> Result<()>;
}

// ── Process Execution Port ────────────────────────────────────────────────────

/// Async process execution with guaranteed timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command with the default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a command with an explicit timeout.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}
