//! Infrastructure implementation of the `StateStore` port.
//!
//! `FileStateStore` keeps the `received` and `current` signal blobs under
//! `{workdir}/state/`. Each slot has its own writer lock, and writes go
//! through a temp file in the same directory followed by a rename, so a
//! reader never observes a half-written blob.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::{StateSlot, StateStore};

pub struct FileStateStore {
    dir: PathBuf,
    received: Mutex<()>,
    current: Mutex<()>,
}

impl FileStateStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            received: Mutex::new(()),
            current: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn slot_path(&self, slot: StateSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    fn lock_for(&self, slot: StateSlot) -> &Mutex<()> {
        match slot {
            StateSlot::Received => &self.received,
            StateSlot::Current => &self.current,
        }
    }
}

fn load_sync(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading state file {}", path.display())),
    }
}

fn save_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state file {} has no parent", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    temp.write_all(bytes)
        .with_context(|| format!("writing temp file for {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp.path().display()))?;
    }

    temp.persist(path)
        .with_context(|| format!("finalizing state file {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, slot: StateSlot) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock_for(slot).lock().await;
        let path = self.slot_path(slot);
        tokio::task::spawn_blocking(move || load_sync(&path))
            .await
            .context("state load task panicked")?
    }

    async fn save(&self, slot: StateSlot, bytes: &[u8]) -> Result<()> {
        let _guard = self.lock_for(slot).lock().await;
        let path = self.slot_path(slot);
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || save_sync(&path, &bytes))
            .await
            .context("state save task panicked")?
    }
}
