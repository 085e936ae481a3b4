//! systemd implementation of the `ServiceControl` port.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::application::ports::{CommandRunner, ServiceControl};
use crate::domain::{Service, ServiceStatus};
use crate::infra::command_runner::stdout_of;

const LOAD_STATE_NOT_FOUND: &str = "not-found";

pub struct SystemdServiceControl {
    runner: Arc<dyn CommandRunner>,
}

impl SystemdServiceControl {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn privileged(&self, args: &[&str]) -> Result<()> {
        let mut full = vec!["systemctl"];
        full.extend_from_slice(args);
        let output = self
            .runner
            .run("sudo", &full)
            .await
            .with_context(|| format!("running systemctl {}", args.join(" ")))?;
        stdout_of(&output, "systemctl")?;
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for SystemdServiceControl {
    async fn status(&self, service: Service) -> Result<ServiceStatus> {
        // is-active exits non-zero for inactive units; stdout still holds the state
        let output = self
            .runner
            .run("systemctl", &["is-active", service.unit_name()])
            .await
            .with_context(|| format!("querying {service} status"))?;
        Ok(ServiceStatus::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn already_installed(&self, service: Service) -> Result<bool> {
        let output = self
            .runner
            .run(
                "systemctl",
                &["show", service.unit_name(), "-p", "LoadState", "--value"],
            )
            .await
            .with_context(|| format!("querying {service} load state"))?;
        let state = stdout_of(&output, "systemctl show")?;
        Ok(!state.is_empty() && state != LOAD_STATE_NOT_FOUND)
    }

    async fn restart(&self, service: Service) -> Result<()> {
        self.privileged(&["restart", service.unit_name()]).await?;
        tracing::info!(%service, "service restarted");
        Ok(())
    }

    async fn stop(&self, service: Service) -> Result<()> {
        self.privileged(&["stop", service.unit_name()]).await?;
        tracing::info!(%service, "service stopped");
        Ok(())
    }

    async fn daemon_reload(&self) -> Result<()> {
        self.privileged(&["daemon-reload"]).await
    }
}
