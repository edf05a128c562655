use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use institute_core::backup::BackupState;
use tracing::warn;

pub const STATE_FILE: &str = "backup_state.json";

/// `backup_state.json` inside the backup directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// `None` when the file is missing, unreadable or not valid state JSON.
    pub async fn try_read(&self) -> Option<BackupState> {
        let path = self.path();
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %path.display(), err = %e, "ignoring unparseable backup state");
                None
            }
        }
    }

    pub async fn read(&self) -> BackupState {
        self.try_read().await.unwrap_or_default()
    }

    /// Replaces the stored state. Written to a temp file first so a crash
    /// never leaves a truncated state behind.
    pub async fn write(&self, state: &BackupState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path();
        let tmp = self.dir.join(format!("{STATE_FILE}.tmp"));
        let body = serde_json::to_vec_pretty(state).context("encoding backup state")?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
