//! Application service: core agent install, update and self-removal.

use std::sync::Arc;

use anyhow::{Context, Result};
use docp_common::signal::{LATEST, VENDOR_DATADOG, lists_vendor};

use crate::application::ports::{AgentLifecycle, ConfigStore, ServiceControl};
use crate::application::services::notifier::{Phases, Transaction, TransactionNotifier};
use crate::application::services::poll::{PollOutcome, PollPolicy, poll_until};
use crate::domain::phase::{
    UNINSTALL_DOCP_COMPLETED, UNINSTALL_DOCP_ERROR, UNINSTALL_DOCP_PROCESSING,
    UNINSTALL_DOCP_RECEIVED, UPDATE_DOCP_COMPLETED, UPDATE_DOCP_ERROR, UPDATE_DOCP_INITIATE,
    UPDATE_DOCP_RECEIVED,
};
use crate::domain::{Service, UpdateError};

const UNINSTALL_PHASES: Phases = Phases {
    received: UNINSTALL_DOCP_RECEIVED,
    processing: UNINSTALL_DOCP_PROCESSING,
    completed: UNINSTALL_DOCP_COMPLETED,
    error: UNINSTALL_DOCP_ERROR,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreUpdateOutcome {
    /// The agent was not running and was installed at the requested version.
    Installed(String),
    UpToDate,
    /// The updater was launched; it owns the health poll and rollback.
    Handed { from: String, to: String },
}

pub struct CoreAgentService {
    services: Arc<dyn ServiceControl>,
    agent: Arc<dyn AgentLifecycle>,
    config: Arc<dyn ConfigStore>,
    notifier: Arc<TransactionNotifier>,
    teardown: PollPolicy,
}

impl CoreAgentService {
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceControl>,
        agent: Arc<dyn AgentLifecycle>,
        config: Arc<dyn ConfigStore>,
        notifier: Arc<TransactionNotifier>,
    ) -> Self {
        Self {
            services,
            agent,
            config,
            notifier,
            teardown: PollPolicy::VENDOR_TEARDOWN,
        }
    }

    #[must_use]
    pub fn with_teardown_policy(mut self, policy: PollPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Install the core agent at the configured version unless it already runs.
    ///
    /// Returns `true` when an install was performed.
    ///
    /// # Errors
    ///
    /// Returns an error if the service state, the config or the release index
    /// cannot be read, or the install fails.
    pub async fn ensure_installed(&self) -> Result<bool> {
        let status = self
            .services
            .status(Service::CoreAgent)
            .await
            .context("reading core agent status")?;
        if status.is_active() {
            return Ok(false);
        }
        let configured = self.config.load().await?.version;
        let version = self.resolve(&configured).await?;
        self.agent
            .install(&version)
            .await
            .with_context(|| format!("installing core agent {version}"))?;
        tracing::info!(%version, "core agent installed");
        Ok(true)
    }

    /// Move the core agent to `requested` (`latest` resolves through the
    /// release index).
    ///
    /// The target and rollback versions are persisted before the updater is
    /// launched and restored if the launch fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the service state or config cannot be read, the
    /// version cannot be resolved, or the install or updater launch fails.
    pub async fn update(&self, requested: &str) -> Result<CoreUpdateOutcome> {
        let status = self
            .services
            .status(Service::CoreAgent)
            .await
            .context("reading core agent status")?;
        let target = self.resolve(requested).await?;

        if !status.is_active() {
            self.agent
                .install(&target)
                .await
                .with_context(|| format!("installing core agent {target}"))?;
            self.config
                .modify(&mut |c| c.version.clone_from(&target))
                .await?;
            tracing::info!(version = %target, "core agent was not running, installed");
            return Ok(CoreUpdateOutcome::Installed(target));
        }

        let before = self.config.load().await?;
        if before.version == target {
            tracing::debug!(version = %target, "core agent up to date");
            return Ok(CoreUpdateOutcome::UpToDate);
        }

        let tx = Transaction::begin();
        let message = format!("update core agent from {} to {target}", before.version);
        self.notifier.open(&tx, UPDATE_DOCP_RECEIVED, &message).await;
        self.notifier.update(&tx, UPDATE_DOCP_INITIATE, &message).await;

        let persisted = self
            .config
            .modify(&mut |c| {
                c.rollback_version.clone_from(&before.version);
                c.version.clone_from(&target);
            })
            .await;
        if let Err(e) = persisted {
            self.notifier
                .close(&tx, UPDATE_DOCP_ERROR, &format!("{e:#}"))
                .await;
            return Err(e.context("persisting core agent target version"));
        }

        if let Err(e) = self.agent.update(&target).await {
            let restored = self
                .config
                .modify(&mut |c| {
                    c.version.clone_from(&before.version);
                    c.rollback_version.clone_from(&before.rollback_version);
                })
                .await;
            if let Err(restore) = restored {
                let error = format!("{restore:#}");
                tracing::warn!(%error, "could not restore core agent versions");
            }
            self.notifier
                .close(&tx, UPDATE_DOCP_ERROR, &format!("{e:#}"))
                .await;
            return Err(e.context(format!("launching core agent updater for {target}")));
        }

        self.notifier.close(&tx, UPDATE_DOCP_COMPLETED, &message).await;
        Ok(CoreUpdateOutcome::Handed {
            from: before.version,
            to: target,
        })
    }

    /// Remove the core agent, its updater and the manager.
    ///
    /// Waits first for every other vendor named in `remove_other_vendors`
    /// (directly or through `all`) to stop running, so their own uninstall
    /// is not cut short.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown wait expires or the uninstall fails.
    pub async fn auto_uninstall(&self, remove_other_vendors: &[String]) -> Result<()> {
        if lists_vendor(remove_other_vendors, VENDOR_DATADOG) {
            self.wait_for_vendor_teardown().await?;
        }

        self.notifier
            .bracket(&UNINSTALL_PHASES, "removing core agent", async {
                let configured = self.config.load().await?.version;
                let version = self.resolve(&configured).await?;
                self.agent
                    .auto_uninstall(&version)
                    .await
                    .with_context(|| format!("removing core agent {version}"))
            })
            .await
    }

    async fn wait_for_vendor_teardown(&self) -> Result<()> {
        let services = &self.services;
        let outcome = poll_until(self.teardown, || {
            let services = Arc::clone(services);
            async move { anyhow::Ok(!services.status(Service::Vendor).await?.is_active()) }
        })
        .await;
        match outcome {
            PollOutcome::Ready => Ok(()),
            PollOutcome::Exhausted | PollOutcome::DeadlineExceeded => {
                Err(UpdateError::DeadlineExceeded(self.teardown.deadline))
                    .context("waiting for vendor agent teardown")
            }
        }
    }

    async fn resolve(&self, version: &str) -> Result<String> {
        if version.is_empty() || version == LATEST {
            return self
                .agent
                .latest_version()
                .await
                .context("resolving latest core agent release");
        }
        Ok(version.to_string())
    }
}
