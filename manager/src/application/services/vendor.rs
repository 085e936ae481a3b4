//! Application service: monitoring vendor lane.
//!
//! Routes vendor actions by kind, component and mode after checking whether
//! the vendor agent is installed. Long waits (post-install configuration,
//! single-step reinstall, version update) run as tasks on the lane's
//! `JoinSet` so the lane keeps consuming.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docp_common::action::{Action, ActionKind, Component, ConfigFile, Mode};
use docp_common::signal::LATEST;
use tokio::task::JoinSet;

use crate::application::error_sink::ErrorSink;
use crate::application::hash_cache::HashCache;
use crate::application::ports::{ConfigStore, ServiceControl, VendorLifecycle};
use crate::application::services::notifier::{Phases, TransactionNotifier};
use crate::application::services::poll::{PollOutcome, PollPolicy, poll_until};
use crate::application::services::version_update::VersionUpdateController;
use crate::domain::actions::{
    SingleStepEnv, agent_install_env, single_step_env, tracing_library_env,
};
use crate::domain::digest::fingerprint;
use crate::domain::phase::{
    INSTALL_TRACER_COMPLETED, INSTALL_TRACER_ERROR, INSTALL_TRACER_PROCESSING,
    INSTALL_TRACER_RECEIVED, INSTALL_VENDOR_COMPLETED, INSTALL_VENDOR_ERROR,
    INSTALL_VENDOR_PROCESSING, INSTALL_VENDOR_RECEIVED, UNINSTALL_VENDOR_COMPLETE,
    UNINSTALL_VENDOR_ERROR, UNINSTALL_VENDOR_PROCESSING, UNINSTALL_VENDOR_RECEIVED,
    UPDATE_VENDOR_COMPLETE, UPDATE_VENDOR_ERROR, UPDATE_VENDOR_PROCESSING,
    UPDATE_VENDOR_RECEIVED,
};
use crate::domain::{Service, Severity, UpdateError};

/// Fingerprint of the last configuration file applied.
pub const KEY_CONFIG_HASH: &str = "update.datadog.hash";

const INSTALL_PHASES: Phases = Phases {
    received: INSTALL_VENDOR_RECEIVED,
    processing: INSTALL_VENDOR_PROCESSING,
    completed: INSTALL_VENDOR_COMPLETED,
    error: INSTALL_VENDOR_ERROR,
};

const TRACER_PHASES: Phases = Phases {
    received: INSTALL_TRACER_RECEIVED,
    processing: INSTALL_TRACER_PROCESSING,
    completed: INSTALL_TRACER_COMPLETED,
    error: INSTALL_TRACER_ERROR,
};

const UNINSTALL_PHASES: Phases = Phases {
    received: UNINSTALL_VENDOR_RECEIVED,
    processing: UNINSTALL_VENDOR_PROCESSING,
    completed: UNINSTALL_VENDOR_COMPLETE,
    error: UNINSTALL_VENDOR_ERROR,
};

const CONFIG_PHASES: Phases = Phases {
    received: UPDATE_VENDOR_RECEIVED,
    processing: UPDATE_VENDOR_PROCESSING,
    completed: UPDATE_VENDOR_COMPLETE,
    error: UPDATE_VENDOR_ERROR,
};

/// Waits used by the vendor lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorPolicy {
    /// Wait for the agent to come up before applying configuration files.
    pub install: PollPolicy,
    /// Wait for the previous install to disappear before a single-step install.
    pub reinstall: PollPolicy,
    /// Pause between the agent reporting active and the first file write.
    pub settle: Duration,
}

impl Default for VendorPolicy {
    fn default() -> Self {
        Self {
            install: PollPolicy::VENDOR_INSTALL,
            reinstall: PollPolicy::VENDOR_REINSTALL,
            settle: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct VendorLane {
    services: Arc<dyn ServiceControl>,
    vendor: Arc<dyn VendorLifecycle>,
    config: Arc<dyn ConfigStore>,
    notifier: Arc<TransactionNotifier>,
    cache: Arc<HashCache>,
    versions: Arc<VersionUpdateController>,
    errors: ErrorSink,
    policy: VendorPolicy,
}

impl VendorLane {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceControl>,
        vendor: Arc<dyn VendorLifecycle>,
        config: Arc<dyn ConfigStore>,
        notifier: Arc<TransactionNotifier>,
        cache: Arc<HashCache>,
        versions: Arc<VersionUpdateController>,
        errors: ErrorSink,
        policy: VendorPolicy,
    ) -> Self {
        Self {
            services,
            vendor,
            config,
            notifier,
            cache,
            versions,
            errors,
            policy,
        }
    }

    /// Route one vendor action. Background work is spawned onto `tasks`.
    ///
    /// # Errors
    ///
    /// Returns an error if the install state cannot be read or the inline
    /// part of the operation fails.
    pub async fn process(&self, action: Action, tasks: &mut JoinSet<()>) -> Result<()> {
        let installed = self
            .services
            .already_installed(Service::Vendor)
            .await
            .context("checking vendor agent install")?;
        tracing::debug!(kind = ?action.action, component = ?action.component, mode = ?action.mode, installed, "vendor action");

        match (action.action, action.component, action.mode) {
            (ActionKind::Update, _, _) => self.on_update(&action, installed, tasks).await,
            (ActionKind::Install, Component::Tracer, Mode::SingleStep) => {
                self.on_single_step(&action, installed, tasks).await
            }
            (ActionKind::Install, Component::Tracer, Mode::TracingLibrary) => {
                self.on_tracing_library(&action, installed).await
            }
            (ActionKind::Install, Component::Agent, _) => {
                self.on_agent_install(action, installed, tasks).await
            }
            (ActionKind::Uninstall, _, _) if installed => self.uninstall().await,
            _ => {
                tracing::debug!(kind = ?action.action, "vendor action not applicable");
                Ok(())
            }
        }
    }

    // ── Update ────────────────────────────────────────────────────────────────

    async fn on_update(
        &self,
        action: &Action,
        installed: bool,
        tasks: &mut JoinSet<()>,
    ) -> Result<()> {
        if !installed {
            tracing::debug!("vendor agent not installed, update skipped");
            return Ok(());
        }
        for file in &action.files {
            if let Err(e) = self.apply_configuration(file).await {
                self.errors.report("vendor_configuration", Severity::Medium, e);
            }
        }
        if action.version.is_empty() {
            return Ok(());
        }

        let target = if action.version == LATEST {
            self.vendor
                .update_repository()
                .await
                .context("refreshing vendor package index")?;
            self.vendor
                .latest_version()
                .await
                .context("resolving latest vendor version")?
        } else {
            action.version.clone()
        };

        let versions = Arc::clone(&self.versions);
        let errors = self.errors.clone();
        tasks.spawn(async move {
            if let Err(e) = versions.update_version(&target).await {
                errors.report("vendor_version_update", Severity::High, e);
            }
        });
        Ok(())
    }

    /// Write one configuration file, reload and restart the vendor agent.
    ///
    /// Skipped when the same file content was the last one applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be fingerprinted, written, or the
    /// vendor service cannot be restarted.
    pub async fn apply_configuration(&self, file: &ConfigFile) -> Result<()> {
        let hash = fingerprint(file)?;
        if self.cache.get_text(KEY_CONFIG_HASH).as_deref() == Some(hash.as_str()) {
            tracing::debug!(path = %file.file_path, "configuration already applied");
            return Ok(());
        }
        let message = format!("apply configuration {}", file.file_path);
        self.notifier
            .bracket(&CONFIG_PHASES, &message, async {
                self.vendor
                    .apply_configuration(file)
                    .await
                    .with_context(|| format!("writing {}", file.file_path))?;
                self.cache.set(KEY_CONFIG_HASH, hash.clone())?;
                self.services.daemon_reload().await?;
                self.services.restart(Service::Vendor).await
            })
            .await
    }

    // ── Agent install ─────────────────────────────────────────────────────────

    async fn on_agent_install(
        &self,
        action: Action,
        installed: bool,
        tasks: &mut JoinSet<()>,
    ) -> Result<()> {
        if installed {
            tracing::debug!("vendor agent already installed");
            return Ok(());
        }
        let env = agent_install_env(&action)?;
        self.notifier
            .bracket(
                &INSTALL_PHASES,
                "install vendor agent",
                self.vendor.install_agent(&env.site, &env.api_key),
            )
            .await?;

        if action.files.is_empty() {
            return Ok(());
        }
        let lane = self.clone();
        tasks.spawn(async move {
            if let Err(e) = lane.configure_after_install(action.files).await {
                lane.errors.report("vendor_post_install", Severity::Medium, e);
            }
        });
        Ok(())
    }

    async fn configure_after_install(&self, files: Vec<ConfigFile>) -> Result<()> {
        let services = &self.services;
        let outcome = poll_until(self.policy.install, || {
            let services = Arc::clone(services);
            async move { anyhow::Ok(services.status(Service::Vendor).await?.is_active()) }
        })
        .await;
        if outcome != PollOutcome::Ready {
            return Err(UpdateError::DeadlineExceeded(self.policy.install.deadline))
                .context("waiting for vendor agent after install");
        }

        tokio::time::sleep(self.policy.settle).await;
        for file in &files {
            if let Err(e) = self.apply_configuration(file).await {
                self.errors.report("vendor_configuration", Severity::Medium, e);
            }
        }
        Ok(())
    }

    // ── Tracers ───────────────────────────────────────────────────────────────

    async fn on_single_step(
        &self,
        action: &Action,
        installed: bool,
        tasks: &mut JoinSet<()>,
    ) -> Result<()> {
        let env = single_step_env(action)?;
        if !installed {
            return self.install_single_step(&env).await;
        }
        let lane = self.clone();
        tasks.spawn(async move {
            if let Err(e) = lane.reinstall_with_single_step(env).await {
                lane.errors.report("vendor_single_step", Severity::High, e);
            }
        });
        Ok(())
    }

    async fn install_single_step(&self, env: &SingleStepEnv) -> Result<()> {
        self.notifier
            .bracket(
                &TRACER_PHASES,
                "install single step tracer",
                self.vendor.install_apm_single_step(env),
            )
            .await?;
        self.config
            .modify(&mut |c| c.already_tracer = true)
            .await?;
        Ok(())
    }

    /// Single step owns the install path: remove the current agent first.
    async fn reinstall_with_single_step(&self, env: SingleStepEnv) -> Result<()> {
        self.uninstall().await?;
        let services = &self.services;
        let outcome = poll_until(self.policy.reinstall, || {
            let services = Arc::clone(services);
            async move { anyhow::Ok(!services.already_installed(Service::Vendor).await?) }
        })
        .await;
        if outcome != PollOutcome::Ready {
            return Err(UpdateError::DeadlineExceeded(self.policy.reinstall.deadline))
                .context("waiting for vendor agent removal");
        }
        self.install_single_step(&env).await
    }

    async fn on_tracing_library(&self, action: &Action, installed: bool) -> Result<()> {
        if !installed {
            tracing::debug!("vendor agent not installed, tracing library skipped");
            return Ok(());
        }
        let env = tracing_library_env(action)?;
        if !self.services.status(Service::Vendor).await?.is_active() {
            tracing::debug!("vendor agent not active, tracing library skipped");
            return Ok(());
        }
        if self.config.load().await?.has_tracer_language(&env.language) {
            tracing::debug!(language = %env.language, "tracing library already installed");
            return Ok(());
        }

        self.notifier
            .bracket(
                &TRACER_PHASES,
                &format!("install {} tracing library", env.language),
                self.vendor.install_apm_tracing_library(&env),
            )
            .await?;
        self.config
            .modify(&mut |c| {
                if !c.has_tracer_language(&env.language) {
                    c.tracer_languages.push(env.language.clone());
                }
                c.already_tracer = true;
            })
            .await?;
        Ok(())
    }

    // ── Uninstall ─────────────────────────────────────────────────────────────

    async fn uninstall(&self) -> Result<()> {
        self.notifier
            .bracket(
                &UNINSTALL_PHASES,
                "uninstall vendor agent",
                self.vendor.uninstall_agent(),
            )
            .await?;
        self.config
            .modify(&mut |c| {
                c.tracer_languages.clear();
                c.already_tracer = false;
            })
            .await?;
        tracing::info!("vendor agent uninstalled");
        Ok(())
    }
}
