//! Datadog implementation of the `VendorLifecycle` port.
//!
//! Installs, tracers, uninstalls and configuration writes go through the
//! core agent's loopback API. Version queries and version changes use apt
//! directly.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docp_common::ConfigFile;
use docp_common::action::{Component, EnvVar, Mode};
use regex::Regex;

use crate::application::ports::{CommandRunner, VendorLifecycle};
use crate::domain::UpdateError;
use crate::domain::actions::{
    DD_APM_INSTRUMENTATION_ENABLED, DD_APM_INSTRUMENTATION_LIBRARIES, DD_ENV, SingleStepEnv,
    TRACER_LANGUAGE, TRACER_PATH, TRACER_VERSION, TracingLibraryEnv,
};
use crate::infra::command_runner::{INSTALLER_TIMEOUT, stdout_of};
use crate::infra::local_agent::{InstallRequest, LocalAgentClient};

pub const PACKAGE: &str = "datadog-agent";

const INSTALLED_PREFIX: &str = "Installed:";
const CANDIDATE_PREFIX: &str = "Candidate:";

// ── apt-cache parsing ─────────────────────────────────────────────────────────

/// `major.minor.patch` following `prefix` in `apt-cache policy` output.
///
/// The epoch and Debian revision are dropped: `Installed: 1:7.50.3-1`
/// yields `7.50.3`.
#[must_use]
pub fn parse_policy_version(policy: &str, prefix: &str) -> Option<String> {
    let pattern = format!(r"{}\s*([0-9]+:)?([0-9]+\.[0-9]+\.[0-9]+)-[0-9]+", regex::escape(prefix));
    let re = Regex::new(&pattern).ok()?;
    re.captures(policy)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
}

/// Full package version (epoch and revision) for `version` in the version
/// table of `apt-cache policy` output.
#[must_use]
pub fn find_package_version(policy: &str, version: &str) -> Option<String> {
    let wanted = format!("{version}-");
    policy
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|first| !first.ends_with(':'))
        })
        .flat_map(str::split_whitespace)
        .find(|token| {
            let bare = token.split_once(':').map_or(*token, |(_, rest)| rest);
            bare.starts_with(&wanted)
        })
        .map(str::to_string)
}

// ── Adapter ───────────────────────────────────────────────────────────────────

pub struct DatadogVendor {
    local: LocalAgentClient,
    runner: Arc<dyn CommandRunner>,
}

impl DatadogVendor {
    #[must_use]
    pub fn new(local: LocalAgentClient, runner: Arc<dyn CommandRunner>) -> Self {
        Self { local, runner }
    }

    async fn policy(&self) -> Result<String> {
        let output = self
            .runner
            .run("apt-cache", &["policy", PACKAGE])
            .await
            .context("querying apt policy")?;
        stdout_of(&output, "apt-cache policy")
    }

    async fn install_package(&self, version: &str) -> Result<()> {
        let policy = self.policy().await?;
        let full = find_package_version(&policy, version)
            .ok_or_else(|| UpdateError::VersionNotFound(version.to_string()))?;
        let spec = format!("{PACKAGE}={full}");
        let output = self
            .runner
            .run_with_timeout(
                "sudo",
                &["apt-get", "install", "-y", "--allow-downgrades", &spec],
                INSTALLER_TIMEOUT,
            )
            .await
            .with_context(|| format!("installing {spec}"))?;
        stdout_of(&output, "apt-get install")?;
        tracing::info!(package = %spec, "vendor package installed");
        Ok(())
    }
}

#[async_trait]
impl VendorLifecycle for DatadogVendor {
    async fn install_agent(&self, site: &str, api_key: &str) -> Result<()> {
        self.local.health().await?;
        self.local
            .install(&InstallRequest {
                dd_site: site.to_string(),
                dd_api_key: api_key.to_string(),
                mode: Mode::None,
                component: Component::None,
                env_vars: Vec::new(),
            })
            .await?;
        Ok(())
    }

    async fn install_apm_single_step(&self, env: &SingleStepEnv) -> Result<()> {
        self.local.health().await?;
        self.local
            .install(&InstallRequest {
                dd_site: env.site.clone(),
                dd_api_key: env.api_key.clone(),
                mode: Mode::SingleStep,
                component: Component::Tracer,
                env_vars: vec![
                    EnvVar::new(DD_APM_INSTRUMENTATION_ENABLED, &env.instrumentation_enabled),
                    EnvVar::new(DD_APM_INSTRUMENTATION_LIBRARIES, &env.instrumentation_libraries),
                    EnvVar::new(DD_ENV, &env.env),
                ],
            })
            .await?;
        Ok(())
    }

    async fn install_apm_tracing_library(&self, env: &TracingLibraryEnv) -> Result<()> {
        self.local
            .install_tracer(&InstallRequest {
                dd_site: String::new(),
                dd_api_key: String::new(),
                mode: Mode::TracingLibrary,
                component: Component::Tracer,
                env_vars: vec![
                    EnvVar::new(TRACER_LANGUAGE, &env.language),
                    EnvVar::new(TRACER_PATH, &env.path_tracer),
                    EnvVar::new(TRACER_VERSION, &env.version),
                ],
            })
            .await?;
        Ok(())
    }

    async fn uninstall_agent(&self) -> Result<()> {
        self.local.uninstall().await?;
        Ok(())
    }

    async fn apply_configuration(&self, file: &ConfigFile) -> Result<()> {
        self.local.apply_configuration(file).await?;
        Ok(())
    }

    async fn update_repository(&self) -> Result<()> {
        let output = self
            .runner
            .run_with_timeout("sudo", &["bash", "-c", "apt-get update"], INSTALLER_TIMEOUT)
            .await
            .context("refreshing apt index")?;
        stdout_of(&output, "apt-get update")?;
        Ok(())
    }

    async fn update_version(&self, version: &str) -> Result<()> {
        self.local.prepare_version_update(version).await?;
        self.install_package(version).await
    }

    async fn rollback_version(&self, version: &str) -> Result<()> {
        self.install_package(version).await
    }

    async fn version(&self) -> Result<String> {
        let policy = self.policy().await?;
        parse_policy_version(&policy, INSTALLED_PREFIX)
            .ok_or_else(|| UpdateError::InstalledVersionNotFound.into())
    }

    async fn latest_version(&self) -> Result<String> {
        let policy = self.policy().await?;
        parse_policy_version(&policy, CANDIDATE_PREFIX)
            .ok_or_else(|| UpdateError::VersionNotFound("candidate".to_string()).into())
    }
}
