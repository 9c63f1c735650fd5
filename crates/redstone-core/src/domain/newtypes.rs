//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for identifiers and opaque
//! tokens. Each newtype ensures data validity at construction time.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Maximum accepted length of a record identifier
const MAX_RECORD_ID_LEN: usize = 128;

// ============================================================================
// Record identity
// ============================================================================

/// Stable identifier of a Record (file or folder)
///
/// Ids are generated on the device at creation time and never remapped by
/// the server. Locally generated ids are UUID v7, so they sort by creation
/// time. Ids that arrive from the server are accepted verbatim as long as
/// they are safe to embed in a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh, collision-resistant id for a new local record
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Create a RecordId from an existing string
    ///
    /// # Errors
    /// Returns error if the id is empty, too long, or contains characters
    /// that cannot appear in a path segment
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidId("Record ID cannot be empty".to_string()));
        }
        if id.len() > MAX_RECORD_ID_LEN {
            return Err(DomainError::InvalidId(format!(
                "Record ID exceeds {MAX_RECORD_ID_LEN} characters"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(DomainError::InvalidId(format!(
                "Record ID contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier of this device's replica
///
/// Generated once per local database and persisted alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Create a new DeviceId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a DeviceId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid DeviceId: {e}")))
    }
}

/// Identifier of an entry in the superseded-edits side table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupersededId(Uuid);

impl SupersededId {
    /// Create a new SupersededId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SupersededId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SupersededId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SupersededId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SupersededId: {e}")))
    }
}

// ============================================================================
// Opaque server tokens
// ============================================================================

/// Revision token returned by the server when it acknowledges a record
///
/// The token is opaque; it is only sent back as an optimistic precondition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteRevision(String);

impl RemoteRevision {
    /// Create a new RemoteRevision
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DomainError::InvalidToken(
                "Remote revision cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Derive a revision from the server's `updatedAt` when no explicit
    /// revision was sent
    #[must_use]
    pub fn from_timestamp(updated_at: DateTime<Utc>) -> Self {
        Self(updated_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteRevision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RemoteRevision {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteRevision> for String {
    fn from(rev: RemoteRevision) -> Self {
        rev.0
    }
}

/// Watermark of the last point fully reconciled with the remote store
///
/// The value comes from the server (`syncedAt`) and is treated as opaque.
/// When both cursors are RFC 3339 instants they are ordered by time,
/// otherwise lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Create a new SyncCursor
    ///
    /// # Errors
    /// Returns error if the cursor is empty
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidToken(
                "Sync cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The cursor used before the first successful pull
    #[must_use]
    pub fn epoch() -> Self {
        Self("1970-01-01T00:00:00.000Z".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The cursor as an instant, when it is an RFC 3339 timestamp
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Compares two cursors in watermark order
    pub fn watermark_cmp(&self, other: &SyncCursor) -> Ordering {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }

    /// Returns true if this cursor is strictly ahead of `other`
    pub fn is_after(&self, other: &SyncCursor) -> bool {
        self.watermark_cmp(other) == Ordering::Greater
    }
}

impl Display for SyncCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SyncCursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SyncCursor> for String {
    fn from(cursor: SyncCursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// Replica scope
// ============================================================================

/// Scope of persisted sync state: one user on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaKey {
    /// Account the records belong to (the login email)
    pub user_id: String,
    /// This device's replica id
    pub device_id: DeviceId,
}

impl ReplicaKey {
    /// Creates a new ReplicaKey
    ///
    /// # Errors
    /// Returns error if `user_id` is empty
    pub fn new(user_id: impl Into<String>, device_id: DeviceId) -> Result<Self, DomainError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "user id cannot be empty".to_string(),
            ));
        }
        Ok(Self { user_id, device_id })
    }
}

impl Display for ReplicaKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.device_id)
    }
}
