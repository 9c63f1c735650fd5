//! Remote store port (driven/secondary port)
//!
//! This module defines the interface of the canonical store the local
//! replica is reconciled against.
//!
//! ## Design Notes
//!
//! - Records are keyed by the client-generated id, which doubles as the
//!   idempotency key for creation.
//! - Errors use the closed [`RemoteError`] taxonomy instead of
//!   `anyhow::Error`: the push and pull engines branch on the variant
//!   (retry, resolve, abort) and must never inspect adapter internals.
//! - Single-record operations return the server's authoritative version.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    newtypes::{RecordId, RemoteRevision, SyncCursor},
    Payload, Record, RecordKind, RecordParts,
};

// ============================================================================
// Remote DTOs
// ============================================================================

/// A record as returned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub parent_ref: Option<RecordId>,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub revision: RemoteRevision,
}

impl RemoteRecord {
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// True when this version carries the payload and parent of `record`
    pub fn same_content(&self, record: &Record) -> bool {
        &self.payload == record.payload() && self.parent_ref.as_ref() == record.parent_ref()
    }

    /// Converts to a clean (not dirty) local record
    pub fn into_record(self) -> Record {
        Record::from_parts(RecordParts {
            id: self.id,
            parent_ref: self.parent_ref,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            dirty: false,
            remote_revision: Some(self.revision),
        })
    }
}

/// Upserts and deletions for one record kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub upserted: Vec<RemoteRecord>,
    pub deleted: Vec<RecordId>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserted.len() + self.deleted.len()
    }
}

/// Result of a "changes since cursor" query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub files: Changes,
    pub folders: Changes,
    /// Cursor to use for the next query
    pub synced_at: SyncCursor,
}

impl ChangeSet {
    /// An empty change set ending at `synced_at`
    pub fn empty(synced_at: SyncCursor) -> Self {
        Self {
            files: Changes::default(),
            folders: Changes::default(),
            synced_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.folders.len()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a remote store operation
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection could not be established or was interrupted
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within its timeout
    #[error("Request timed out")]
    Timeout,

    /// 5xx and other transient server-side statuses
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 429 Too Many Requests
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The optimistic precondition did not hold
    #[error("Revision conflict: {0}")]
    Conflict(String),

    /// The record does not exist on the server
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing, expired or rejected credential
    #[error("Authentication failed ({status})")]
    Auth { status: u16 },

    /// Any other 4xx: the request itself was refused and will not succeed
    /// when retried unchanged
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server answered with something that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// True for failures that may succeed when retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_)
                | RemoteError::Timeout
                | RemoteError::Server { .. }
                | RemoteError::RateLimited { .. }
        )
    }

    /// Delay the server asked for, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for remote store operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for the canonical remote store
///
/// ## Implementation Notes
///
/// - `create` must be idempotent on the record id: replaying a create whose
///   response was lost returns the existing record instead of a duplicate.
/// - `update` sends `if_match` as a precondition and fails with
///   [`RemoteError::Conflict`] when the server holds a different revision.
/// - `delete` of an id the server no longer has fails with
///   [`RemoteError::NotFound`]; callers treat that as success.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Creates a record under its client-generated id
    async fn create(&self, record: &Record) -> RemoteResult<RemoteRecord>;

    /// Replaces a record, conditional on the server holding `if_match`
    async fn update(&self, record: &Record, if_match: &RemoteRevision)
        -> RemoteResult<RemoteRecord>;

    /// Deletes a record by id
    async fn delete(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<()>;

    /// Fetches the server's current version of a record
    async fn fetch(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<RemoteRecord>;

    /// Everything changed after `cursor`
    async fn changes_since(&self, cursor: &SyncCursor) -> RemoteResult<ChangeSet>;
}
