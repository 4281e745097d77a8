//! State backend trait and error types

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::{LockInfo, LockOperation};
use crate::state::StateFile;

pub use vela_core::parser::BackendConfig;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another process
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: LockOperation,
    },

    /// The lock was not found (for release/force-unlock operations)
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Lock ID mismatch when trying to release
    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Failed to create bucket: {0}")]
    BucketCreationFailed(String),

    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Another state lineage already lives at this location
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS error: {0}")]
    Aws(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a Locked error from a LockInfo
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation,
        }
    }

    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Refuse to overwrite state that belongs to a different lineage
pub(crate) fn check_lineage(existing: Option<&StateFile>, incoming: &StateFile) -> BackendResult<()> {
    match existing {
        Some(existing) if existing.lineage != incoming.lineage => {
            Err(BackendError::LineageMismatch {
                expected: existing.lineage.clone(),
                actual: incoming.lineage.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// Trait for state storage backends
///
/// Implementations store the state file and a lock object next to it.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state from the backend
    ///
    /// Returns `None` if no state exists (first-time use)
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state to the backend
    ///
    /// The state's serial number should be incremented before calling this
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Acquire a lock for the given operation
    ///
    /// Fails with `Locked` if another unexpired lock is held
    async fn acquire_lock(&self, operation: LockOperation) -> BackendResult<LockInfo>;

    /// Release a previously acquired lock
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Force release a lock by its ID
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;

    /// Prepare the backend storage (directory, bucket) if missing
    async fn init(&self) -> BackendResult<()>;

    /// Human-readable location of the state, for messages
    fn location(&self) -> String;
}
