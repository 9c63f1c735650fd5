//! Local store port (driven/secondary port)
//!
//! This module defines the interface of the durable, per-device replica of
//! the user's records, together with the sync bookkeeping that lives next
//! to it: superseded edits, retired ids and the sync cursor.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Every write is atomic per record. [`MergeBatch`] groups the writes of a
//!   single merge decision so they land together or not at all.
//! - A store instance is bound to one [`ReplicaKey`] (user, device); the
//!   cursor and all records are scoped to it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    newtypes::{RecordId, ReplicaKey, SupersededId, SyncCursor},
    Record, RecordKind, SupersededEdit,
};
use crate::ports::RemoteRecord;

// ============================================================================
// RecordFilter
// ============================================================================

/// Filter criteria for listing records
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic. Tombstones are
/// excluded unless [`RecordFilter::including_tombstoned`] is set.
///
/// # Example
///
/// ```
/// use redstone_core::ports::RecordFilter;
/// use redstone_core::domain::RecordKind;
///
/// // Live files at the root whose title or content mentions "todo"
/// let filter = RecordFilter::new()
///     .with_kind(RecordKind::File)
///     .with_parent(None)
///     .with_text("todo");
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Filter by record kind
    pub kind: Option<RecordKind>,
    /// Filter by parent; `Some(None)` selects root-level records
    pub parent: Option<Option<RecordId>>,
    /// Filter by dirty flag
    pub dirty: Option<bool>,
    /// Include tombstoned records
    pub include_tombstoned: bool,
    /// Case-insensitive match on title, content or folder name
    pub text: Option<String>,
    /// Maximum number of records returned
    pub limit: Option<u32>,
}

impl RecordFilter {
    /// Creates a new filter that matches every live record
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_parent(mut self, parent: Option<RecordId>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn including_tombstoned(mut self) -> Self {
        self.include_tombstoned = true;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.parent.is_none()
            && self.dirty.is_none()
            && !self.include_tombstoned
            && self.text.is_none()
            && self.limit.is_none()
    }

    /// Evaluates the filter against a record (the limit is not applied)
    pub fn matches(&self, record: &Record) -> bool {
        if !self.include_tombstoned && record.is_tombstoned() {
            return false;
        }
        if let Some(kind) = self.kind {
            if record.kind() != kind {
                return false;
            }
        }
        if let Some(parent) = &self.parent {
            if record.parent_ref() != parent.as_ref() {
                return false;
            }
        }
        if let Some(dirty) = self.dirty {
            if record.is_dirty() != dirty {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !record.payload().contains_text(text) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Write helpers
// ============================================================================

/// Who set a tombstone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneOrigin {
    /// Local delete: the tombstone is dirty until the remote confirms it
    Local,
    /// Remote delete: the tombstone is already reconciled
    Remote,
}

/// Writes produced by one merge decision, applied in a single transaction
///
/// The batch is rejected as a whole when a guard no longer holds (the
/// record was edited concurrently) or when an upsert would regress a newer
/// stored version.
#[derive(Debug, Clone, Default)]
pub struct MergeBatch {
    /// Records whose stored `updated_at` must still equal the given value
    pub guards: Vec<(RecordId, DateTime<Utc>)>,
    /// Records to upsert
    pub upserts: Vec<Record>,
    /// Records to tombstone as reconciled remote deletes
    pub remote_tombstones: Vec<(RecordId, DateTime<Utc>)>,
    /// Losing versions to retain
    pub superseded: Vec<SupersededEdit>,
}

impl MergeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, record: &Record) -> Self {
        self.guards.push((record.id().clone(), record.updated_at()));
        self
    }

    pub fn upsert(mut self, record: Record) -> Self {
        self.upserts.push(record);
        self
    }

    pub fn remote_tombstone(mut self, id: RecordId, at: DateTime<Utc>) -> Self {
        self.remote_tombstones.push((id, at));
        self
    }

    pub fn supersede(mut self, edit: SupersededEdit) -> Self {
        self.superseded.push(edit);
        self
    }
}

/// Counters for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: u64,
    pub files: u64,
    pub folders: u64,
    pub dirty: u64,
    pub tombstones: u64,
    pub superseded: u64,
    pub retired: u64,
}

// ============================================================================
// ILocalStore trait
// ============================================================================

/// Port trait for the durable local replica
///
/// ## Implementation Notes
///
/// - `upsert` replaces by id and returns `false` (no-op) when the stored
///   `updated_at` is newer, when the stored row is a tombstone and the
///   incoming record is not, or when the id is retired.
/// - `list_dirty` returns records ordered by `updated_at` ascending, ties
///   by id, so pushes go out oldest first.
/// - `acknowledge` clears `dirty` only if the stored `updated_at` still
///   equals the value observed when the push was sent.
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    /// The (user, device) pair this store is bound to
    fn replica(&self) -> &ReplicaKey;

    // --- Record operations ---

    /// Retrieves a record by id, tombstones included
    async fn get(&self, id: &RecordId) -> Result<Option<Record>>;

    /// Lists records matching the filter
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// Inserts or replaces a record by id, rejecting regressions
    async fn upsert(&self, record: &Record) -> Result<bool>;

    /// Tombstones a record
    ///
    /// A `Local` tombstone bumps `updated_at` and marks the record dirty; it
    /// is a no-op for an already tombstoned record. A `Remote` tombstone
    /// clears `dirty` and applies only to clean records or to tombstones
    /// waiting for confirmation, never over an unsynced live edit.
    async fn mark_tombstone(
        &self,
        id: &RecordId,
        at: DateTime<Utc>,
        origin: TombstoneOrigin,
    ) -> Result<bool>;

    /// Lists dirty records, oldest `updated_at` first
    async fn list_dirty(&self) -> Result<Vec<Record>>;

    /// Records a server acknowledgement for a pushed record
    ///
    /// When `server` is present its revision replaces the stored one. If
    /// the row is cleared, it also takes the server's `updated_at`, which
    /// is authoritative over this device's clock.
    async fn acknowledge(
        &self,
        id: &RecordId,
        observed_updated_at: DateTime<Utc>,
        server: Option<&RemoteRecord>,
    ) -> Result<bool>;

    /// Applies the writes of one merge decision atomically
    async fn apply_merge(&self, batch: &MergeBatch) -> Result<bool>;

    // --- Retired ids ---

    /// Remembers that an id was deleted and must never be revived
    async fn retire_id(&self, id: &RecordId) -> Result<()>;

    /// Returns true if the id was retired
    async fn is_retired(&self, id: &RecordId) -> Result<bool>;

    // --- Superseded edits ---

    /// Stores a losing version; storing the same version twice is a no-op
    async fn save_superseded(&self, edit: &SupersededEdit) -> Result<bool>;

    async fn get_superseded(&self, id: &SupersededId) -> Result<Option<SupersededEdit>>;

    /// Lists superseded edits, newest first, optionally for one record
    async fn list_superseded(&self, record_id: Option<&RecordId>) -> Result<Vec<SupersededEdit>>;

    async fn delete_superseded(&self, id: &SupersededId) -> Result<bool>;

    // --- Cursor ---

    /// Retrieves the cursor of this replica
    async fn get_cursor(&self) -> Result<Option<SyncCursor>>;

    /// Moves the cursor forward; returns false if `cursor` is not ahead
    async fn advance_cursor(&self, cursor: &SyncCursor) -> Result<bool>;

    // --- Maintenance ---

    /// Deletes reconciled tombstones deleted before `older_than` and retires
    /// their ids; returns the number of purged records
    async fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Deletes superseded edits recorded before `older_than`
    async fn purge_superseded(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Returns counters for status reporting
    async fn stats(&self) -> Result<StoreStats>;
}
