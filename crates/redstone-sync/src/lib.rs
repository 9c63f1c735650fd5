//! Redstone Sync - Push/pull synchronization engine
//!
//! Provides:
//! - Oldest-first push of dirty records with per-record retry
//! - Cursor-based pull merged through the conflict resolver
//! - A single-flight orchestrator with Idle/Running/Backoff states
//! - A scheduler turning intervals and triggers into runs
//!
//! ## Modules
//!
//! - [`push`] - Sends dirty records and tombstones to the remote store
//! - [`pull`] - Fetches changes since the cursor and merges them locally
//! - [`orchestrator`] - One sync run: connectivity, push, pull, cleanup
//! - [`scheduler`] - Periodic and on-demand runs until shutdown
//! - [`retry`] / [`backoff`] - Bounded jittered retries of remote calls

pub mod backoff;
pub mod orchestrator;
pub mod pull;
pub mod push;
pub mod retry;
pub mod scheduler;

pub use orchestrator::{RunOutcome, SyncOrchestrator, SyncReport, SyncState};
pub use pull::{PullEngine, PullSummary};
pub use push::{PushEngine, PushSummary};
pub use scheduler::{SyncScheduler, SyncTrigger};

use thiserror::Error;

use redstone_conflict::ConflictError;
use redstone_core::domain::DomainError;
use redstone_core::ports::RemoteError;

/// Errors that abort a sync pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store could not be reached, after retries
    #[error("Network error: {0}")]
    Network(String),

    /// The remote store kept failing server-side, after retries
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The credential is missing or was rejected; re-authentication needed
    #[error("Authentication failed ({status})")]
    Auth { status: u16 },

    /// A merge could not be completed because of concurrent local edits
    #[error("Conflict could not be resolved: {0}")]
    Conflict(String),

    /// The remote store answered with something unusable
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A domain-level error propagated from redstone-core
    #[error("Domain error: {0}")]
    Validation(#[from] DomainError),

    /// Local store failure
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// The run was cancelled
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// True when the user must re-authenticate before syncing again
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }

    /// True for failures a later run may get past on its own
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Server { .. } | SyncError::Conflict(_)
        )
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(message) => SyncError::Network(message),
            RemoteError::Timeout => SyncError::Network("request timed out".to_string()),
            RemoteError::Server { status, message } => SyncError::Server { status, message },
            RemoteError::RateLimited { .. } => SyncError::Server {
                status: 429,
                message: "rate limited".to_string(),
            },
            RemoteError::Auth { status } => SyncError::Auth { status },
            RemoteError::Conflict(message) => SyncError::Conflict(message),
            RemoteError::NotFound(message) => SyncError::Protocol(format!("not found: {message}")),
            RemoteError::Rejected { status, message } => {
                SyncError::Protocol(format!("rejected ({status}): {message}"))
            }
            RemoteError::InvalidResponse(message) => SyncError::Protocol(message),
        }
    }
}

impl From<ConflictError> for SyncError {
    fn from(err: ConflictError) -> Self {
        match err {
            ConflictError::Contended { .. } | ConflictError::NotFound(_) => {
                SyncError::Conflict(err.to_string())
            }
            ConflictError::Domain(err) => SyncError::Validation(err),
            ConflictError::Storage(err) => SyncError::Storage(err),
        }
    }
}
