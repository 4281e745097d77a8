//! Vela State Management
//!
//! Persists what Vela has created so later runs can diff, update and destroy
//! it. State is stored by a backend (a local file or an S3 object) and
//! guarded by a lock while an operation runs.
//!
//! # Example
//!
//! ```ignore
//! use vela_state::{create_backend, LockOperation, StateFile};
//!
//! let backend = create_backend(parsed.backend.as_ref()).await?;
//! backend.init().await?;
//!
//! let lock = backend.acquire_lock(LockOperation::Apply).await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... apply changes, record them in `state` ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use lock::{LockInfo, LockOperation};
pub use state::{ResourceState, StateFile};
