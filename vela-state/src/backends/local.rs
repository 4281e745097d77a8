//! Local file backend for state storage
//!
//! State lives in a JSON file (default: vela.state.json) with a sibling
//! `.lock` file created exclusively while an operation runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{
    BackendConfig, BackendError, BackendResult, StateBackend, check_lineage,
};
use crate::lock::{LockInfo, LockOperation};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "vela.state.json";

    /// Backend rooted at the default state file in the current directory
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = sibling(&state_path, "lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config
            .get_string("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_FILE));

        Ok(Self::with_path(path))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the lock file, failing if it already exists
    async fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let content = serde_json::to_vec_pretty(lock)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await;

        match file {
            Ok(mut file) => {
                file.write_all(&content).await?;
                file.sync_all().await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_lock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await? {
            Some(existing) if existing.id == lock_id => {
                fs::remove_file(&self.lock_path).await?;
                Ok(())
            }
            Some(existing) => Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            }),
            None => Err(BackendError::LockNotFound(lock_id.to_string())),
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!(
                "{}: {}",
                self.state_path.display(),
                e
            ))
        })?;

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let existing = self.read_state().await?;
        check_lineage(existing.as_ref(), state)?;

        let content = serde_json::to_string_pretty(state)?;

        if existing.is_some() {
            fs::copy(&self.state_path, sibling(&self.state_path, "backup")).await?;
        }

        // Write beside the target and rename so readers never see a partial file
        let tmp_path = sibling(&self.state_path, "tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.state_path).await?;

        debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: LockOperation) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);
        if self.create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await? {
            Some(existing) if existing.is_expired() => {
                warn!(
                    "Replacing expired lock {} held by {}",
                    existing.id, existing.who
                );
                fs::remove_file(&self.lock_path).await?;
                if self.create_lock(&lock).await? {
                    Ok(lock)
                } else {
                    match self.read_lock().await? {
                        Some(winner) => Err(BackendError::locked(&winner)),
                        None => Err(BackendError::LockNotFound(lock.id)),
                    }
                }
            }
            Some(existing) => Err(BackendError::locked(&existing)),
            // Released between our attempt and the read
            None => {
                if self.create_lock(&lock).await? {
                    Ok(lock)
                } else {
                    Err(BackendError::LockNotFound(lock.id))
                }
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        self.remove_lock(&lock.id).await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        self.remove_lock(lock_id).await
    }

    async fn init(&self) -> BackendResult<()> {
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}

/// `vela.state.json` -> `vela.state.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
