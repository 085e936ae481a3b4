//! Release-script implementation of the `AgentLifecycle` port.
//!
//! Every lifecycle step downloads a versioned shell script from the release
//! host and pipes it to bash. The release index lists published versions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::application::ports::{AgentLifecycle, CommandRunner};
use crate::domain::UpdateError;
use crate::infra::command_runner::{INSTALLER_TIMEOUT, stdout_of};

pub const DEFAULT_RELEASE_URL: &str =
    "https://github.com/DelfiaProducts/docp-agent-os-instance/releases/download";

const INDEX_FILE: &str = "index.json";
const INDEX_TIMEOUT: Duration = Duration::from_secs(60);

/// Published releases, newest first in `latest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReleaseIndex {
    pub latest: String,
    pub versions: Vec<String>,
}

/// Installer scripts published with each release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    InstallAgent,
    UninstallAgent,
    InstallUpdater,
    UninstallUpdater,
    UninstallManager,
}

impl Script {
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::InstallAgent => "install_agent_linux.sh",
            Self::UninstallAgent => "uninstall_agent_linux.sh",
            Self::InstallUpdater => "install_updater_linux.sh",
            Self::UninstallUpdater => "uninstall_updater_linux.sh",
            Self::UninstallManager => "uninstall_manager_linux.sh",
        }
    }
}

/// `curl -L {release}/{version}/{script} | bash`
#[must_use]
pub fn script_command(release_url: &str, version: &str, script: Script) -> String {
    format!(
        "curl -L {}/{version}/{} | bash",
        release_url.trim_end_matches('/'),
        script.file_name()
    )
}

/// Shell line that registers a one-shot crontab job running `command`.
///
/// The job removes itself from the crontab after its first run, so the
/// manager can uninstall itself after this process has exited.
#[must_use]
pub fn one_shot_cron(command: &str) -> String {
    let job = format!("* * * * * {command}; crontab -l | grep -v '{command}' | crontab -");
    format!("(crontab -l 2>/dev/null; echo \"{job}\") | crontab -")
}

pub struct ReleaseInstaller {
    runner: Arc<dyn CommandRunner>,
    client: Client,
    release_url: String,
    workdir: PathBuf,
}

impl ReleaseInstaller {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        release_url: impl Into<String>,
        workdir: PathBuf,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(INDEX_TIMEOUT)
            .build()
            .context("building release HTTP client")?;
        Ok(Self {
            runner,
            client,
            release_url: release_url.into(),
            workdir,
        })
    }

    async fn shell(&self, line: &str) -> Result<()> {
        let output = self
            .runner
            .run_with_timeout("bash", &["-c", line], INSTALLER_TIMEOUT)
            .await
            .with_context(|| format!("running `{line}`"))?;
        stdout_of(&output, "installer")?;
        Ok(())
    }

    async fn run_script(&self, version: &str, script: Script) -> Result<()> {
        tracing::info!(version, script = script.file_name(), "running release script");
        self.shell(&script_command(&self.release_url, version, script))
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the index cannot be fetched or decoded.
    pub async fn fetch_index(&self) -> Result<ReleaseIndex> {
        let url = format!("{}/{INDEX_FILE}", self.release_url.trim_end_matches('/'));
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching {url}"))?
            .error_for_status()
            .with_context(|| format!("fetching {url}"))?
            .json()
            .await
            .context("decoding release index")
    }
}

#[async_trait]
impl AgentLifecycle for ReleaseInstaller {
    async fn install(&self, version: &str) -> Result<()> {
        self.run_script(version, Script::InstallAgent).await
    }

    async fn uninstall(&self, version: &str) -> Result<()> {
        self.run_script(version, Script::UninstallAgent).await
    }

    async fn update(&self, version: &str) -> Result<()> {
        let release_dir = self.workdir.join("bin").join("releases").join(version);
        tokio::fs::create_dir_all(&release_dir)
            .await
            .with_context(|| format!("creating {}", release_dir.display()))?;
        let line = format!(
            "curl -L {}/{version}/{} | VERSION={version} bash",
            self.release_url.trim_end_matches('/'),
            Script::InstallUpdater.file_name()
        );
        tracing::info!(version, "launching updater");
        self.shell(&line).await
    }

    async fn auto_uninstall(&self, version: &str) -> Result<()> {
        self.run_script(version, Script::UninstallAgent).await?;
        self.run_script(version, Script::UninstallUpdater).await?;
        let manager = script_command(&self.release_url, version, Script::UninstallManager);
        self.shell(&one_shot_cron(&manager)).await?;
        tracing::info!(version, "manager self-uninstall scheduled");
        Ok(())
    }

    async fn latest_version(&self) -> Result<String> {
        let index = self.fetch_index().await?;
        if index.latest.is_empty() {
            return Err(UpdateError::VersionNotFound("latest".to_string()).into());
        }
        Ok(index.latest)
    }
}
