//! Record domain entity
//!
//! A Record is a file or folder in the user's note tree, together with the
//! metadata the sync engine needs to reconcile it with the remote store.
//!
//! ## Lifecycle
//!
//! ```text
//!   local create                      pull (materialize)
//!        │                                    │
//!        ▼                                    ▼
//!  ┌───────────┐      push ack        ┌────────────┐
//!  │   Dirty   │ ───────────────────► │   Clean    │
//!  │ (no rev)  │ ◄─────────────────── │ (rev set)  │
//!  └───────────┘     local edit       └────────────┘
//!        │                                    │
//!        │ delete                   delete /  │ remote delete
//!        ▼                                    ▼
//!  ┌───────────┐      push ack        ┌────────────┐
//!  │ Tombstone │ ───────────────────► │ Tombstone  │ ──► purge after retention
//!  │  (dirty)  │                      │  (clean)   │
//!  └───────────┘                      └────────────┘
//! ```
//!
//! A tombstone never becomes live again under the same id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{RecordId, RemoteRevision};

// ============================================================================
// Timestamps
// ============================================================================

/// Truncates an instant to millisecond precision
///
/// Every timestamp stored or compared by the engine goes through this, so
/// values read back from storage compare equal to the ones written.
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// The current instant at millisecond precision
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

// ============================================================================
// RecordKind / Payload
// ============================================================================

/// Kind of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    File,
    Folder,
}

impl RecordKind {
    /// Returns the lowercase name used in storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::File => "file",
            RecordKind::Folder => "folder",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(RecordKind::File),
            "folder" => Ok(RecordKind::Folder),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown record kind: {other}"
            ))),
        }
    }
}

/// Kind-specific content of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    File { title: String, content: String },
    Folder { name: String },
}

impl Payload {
    /// Creates a file payload
    pub fn file(title: impl Into<String>, content: impl Into<String>) -> Self {
        Payload::File {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Creates a folder payload
    pub fn folder(name: impl Into<String>) -> Self {
        Payload::Folder { name: name.into() }
    }

    /// Returns the kind of record this payload belongs to
    pub fn kind(&self) -> RecordKind {
        match self {
            Payload::File { .. } => RecordKind::File,
            Payload::Folder { .. } => RecordKind::Folder,
        }
    }

    /// Title of a file or name of a folder
    pub fn label(&self) -> &str {
        match self {
            Payload::File { title, .. } => title,
            Payload::Folder { name } => name,
        }
    }

    /// Rejects payloads that must never become dirty
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Payload::File { title, .. } if title.trim().is_empty() => Err(
                DomainError::ValidationFailed("file title must not be empty".to_string()),
            ),
            Payload::Folder { name } if name.trim().is_empty() => Err(
                DomainError::ValidationFailed("folder name must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Stable byte rendering used as the last tie-breaker between versions
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Case-insensitive substring search over the textual fields
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match self {
            Payload::File { title, content } => {
                title.to_lowercase().contains(&needle) || content.to_lowercase().contains(&needle)
            }
            Payload::Folder { name } => name.to_lowercase().contains(&needle),
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// All fields of a [`Record`], used by storage adapters to rebuild one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordParts {
    pub id: RecordId,
    pub parent_ref: Option<RecordId>,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub dirty: bool,
    pub remote_revision: Option<RemoteRevision>,
}

/// A file or folder with its per-record sync metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    parent_ref: Option<RecordId>,
    payload: Payload,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    dirty: bool,
    remote_revision: Option<RemoteRevision>,
}

impl Record {
    /// Creates a record for a local mutation: dirty, never acknowledged
    pub fn new_local(
        id: RecordId,
        parent_ref: Option<RecordId>,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        payload.validate()?;
        let now = truncate_millis(now);
        Ok(Self {
            id,
            parent_ref,
            payload,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            dirty: true,
            remote_revision: None,
        })
    }

    /// Creates a record as acknowledged by the remote store (not dirty)
    pub fn from_remote(
        id: RecordId,
        parent_ref: Option<RecordId>,
        payload: Payload,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        revision: RemoteRevision,
    ) -> Self {
        Self {
            id,
            parent_ref,
            payload,
            created_at: truncate_millis(created_at),
            updated_at: truncate_millis(updated_at),
            deleted_at: None,
            dirty: false,
            remote_revision: Some(revision),
        }
    }

    /// Rebuilds a record from stored fields
    pub fn from_parts(parts: RecordParts) -> Self {
        Self {
            id: parts.id,
            parent_ref: parts.parent_ref,
            payload: parts.payload,
            created_at: truncate_millis(parts.created_at),
            updated_at: truncate_millis(parts.updated_at),
            deleted_at: parts.deleted_at.map(truncate_millis),
            dirty: parts.dirty,
            remote_revision: parts.remote_revision,
        }
    }

    /// Decomposes the record into its fields
    pub fn into_parts(self) -> RecordParts {
        RecordParts {
            id: self.id,
            parent_ref: self.parent_ref,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            dirty: self.dirty,
            remote_revision: self.remote_revision,
        }
    }

    // --- accessors ---

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    pub fn parent_ref(&self) -> Option<&RecordId> {
        self.parent_ref.as_ref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn remote_revision(&self) -> Option<&RemoteRevision> {
        self.remote_revision.as_ref()
    }

    /// True if the server has never acknowledged this record
    pub fn is_new(&self) -> bool {
        self.remote_revision.is_none()
    }

    // --- local mutations ---

    /// Marks the record dirty and moves `updated_at` strictly forward
    ///
    /// Uses `max(now, updated_at + 1ms)` so the per-record timestamp keeps
    /// increasing even when the wall clock steps backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::milliseconds(1);
        self.updated_at = truncate_millis(now).max(floor);
        self.dirty = true;
    }

    /// Replaces the payload as a local edit
    pub fn set_payload(&mut self, payload: Payload, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_live()?;
        payload.validate()?;
        if payload.kind() != self.kind() {
            return Err(DomainError::ValidationFailed(format!(
                "cannot change {} {} into a {}",
                self.kind(),
                self.id,
                payload.kind()
            )));
        }
        self.payload = payload;
        self.touch(now);
        Ok(())
    }

    /// Changes the parent folder as a local edit
    pub fn set_parent(
        &mut self,
        parent_ref: Option<RecordId>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_live()?;
        if parent_ref.as_ref() == Some(&self.id) {
            return Err(DomainError::Cycle(format!(
                "{} cannot be its own parent",
                self.id
            )));
        }
        self.parent_ref = parent_ref;
        self.touch(now);
        Ok(())
    }

    /// Sets the tombstone as a local delete; returns false if already deleted
    pub fn tombstone(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_tombstoned() {
            return false;
        }
        self.touch(now);
        self.deleted_at = Some(self.updated_at);
        true
    }

    /// Copies this record's content under a new id as a fresh local record
    ///
    /// Used when the remote deleted a record that still had unsynced local
    /// edits: the edit survives under `new_id`, the old id stays deleted.
    pub fn resurrect_as(&self, new_id: RecordId, now: DateTime<Utc>) -> Record {
        let now = truncate_millis(now).max(self.updated_at);
        Record {
            id: new_id,
            parent_ref: self.parent_ref.clone(),
            payload: self.payload.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            dirty: true,
            remote_revision: None,
        }
    }

    // --- sync bookkeeping ---

    /// Records a server acknowledgement of the current local state
    pub fn mark_synced(&mut self, revision: RemoteRevision) {
        self.remote_revision = Some(revision);
        self.dirty = false;
    }

    /// Adopts a remote revision without clearing the dirty flag
    pub fn adopt_revision(&mut self, revision: RemoteRevision) {
        self.remote_revision = Some(revision);
    }

    /// Raises `updated_at` to at least `floor` without marking dirty
    pub fn raise_updated_at(&mut self, floor: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(truncate_millis(floor));
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if self.is_tombstoned() {
            return Err(DomainError::Tombstoned(self.id.to_string()));
        }
        Ok(())
    }
}
