//! Infrastructure implementation of the `ConfigStore` port.
//!
//! File access runs on the blocking pool. One async lock serializes
//! read-modify-write cycles within this process.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use docp_common::AgentConfig;
use tokio::sync::Mutex;

use crate::application::ports::ConfigStore;

/// Agent config kept as YAML on disk, re-read on every access.
pub struct YamlConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl YamlConfigStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<AgentConfig> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_sync(&path))
            .await
            .context("config read task panicked")?
    }

    async fn write(&self, config: &AgentConfig) -> Result<()> {
        let path = self.path.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || write_sync(&path, &config))
            .await
            .context("config write task panicked")?
    }
}

fn read_sync(path: &Path) -> Result<AgentConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AgentConfig::default()),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    if content.trim().is_empty() {
        return Ok(AgentConfig::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
}

fn write_sync(path: &Path, config: &AgentConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let content = serde_yaml::to_string(config).context("cannot serialize config")?;
    std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[async_trait]
impl ConfigStore for YamlConfigStore {
    async fn load(&self) -> Result<AgentConfig> {
        self.read().await
    }

    async fn save(&self, config: &AgentConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(config).await
    }

    async fn modify(
        &self,
        mutate: &mut (dyn for<'c> FnMut(&'c mut AgentConfig) + Send),
    ) -> Result<AgentConfig> {
        let _guard = self.write_lock.lock().await;
        let mut config = self.read().await?;
        mutate(&mut config);
        self.write(&config).await?;
        Ok(config)
    }
}
