//! Application context: settings plus the adapters built from them.
//!
//! Constructed once in `Cli::run()`. Every subcommand that talks to the
//! host or the control plane goes through the same wiring.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, ConfigStore};
use crate::application::services::reconcile::Collaborators;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::control_plane::ControlPlaneClient;
use crate::infra::datadog::DatadogVendor;
use crate::infra::local_agent::LocalAgentClient;
use crate::infra::release::ReleaseInstaller;
use crate::infra::state::FileStateStore;
use crate::infra::systemd::SystemdServiceControl;
use crate::settings::Settings;

pub struct AppContext {
    pub settings: Settings,
    pub collaborators: Collaborators,
}

impl AppContext {
    /// Build the production adapters for `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform is unsupported or an HTTP client
    /// cannot be built.
    pub fn new(settings: Settings) -> Result<Self> {
        ensure_supported_platform()?;

        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::default());
        let config: Arc<dyn ConfigStore> = Arc::new(YamlConfigStore::new(settings.config_path()));
        let control_plane = Arc::new(
            ControlPlaneClient::new(settings.domain.clone(), Arc::clone(&config))
                .context("building control plane client")?,
        );
        let local = LocalAgentClient::new(settings.agent_port).context("building local agent client")?;
        let agent = ReleaseInstaller::new(
            Arc::clone(&runner),
            settings.release_url.clone(),
            settings.workdir_path.clone(),
        )
        .context("building release installer")?;

        let collaborators = Collaborators {
            source: control_plane.clone(),
            auth: control_plane,
            services: Arc::new(SystemdServiceControl::new(Arc::clone(&runner))),
            agent: Arc::new(agent),
            vendor: Arc::new(DatadogVendor::new(local, runner)),
            config,
            state: Arc::new(FileStateStore::new(settings.state_dir())),
        };
        Ok(Self {
            settings,
            collaborators,
        })
    }
}

/// Only Linux hosts are managed.
///
/// # Errors
///
/// Returns an error on any other operating system.
pub fn ensure_supported_platform() -> Result<()> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        anyhow::bail!(
            "unsupported platform: {} (only linux hosts are managed)",
            std::env::consts::OS
        )
    }
}
