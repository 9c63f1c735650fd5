//! Superseded edits
//!
//! When a merge picks one version of a record over another, the losing
//! payload is kept here so the user can recover it. Entries are never
//! consulted by the sync engine itself.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{RecordId, SupersededId};
use super::record::{now_millis, truncate_millis, Payload, RecordKind};

/// Why a version lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedeReason {
    /// A newer remote version replaced an unsynced local edit
    RemoteNewer,
    /// An unsynced local edit won over an older remote version
    LocalNewer,
    /// The remote deleted the record; the local edit moved to a new id
    RemoteDeleted,
}

impl SupersedeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupersedeReason::RemoteNewer => "remote_newer",
            SupersedeReason::LocalNewer => "local_newer",
            SupersedeReason::RemoteDeleted => "remote_deleted",
        }
    }
}

impl fmt::Display for SupersedeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SupersedeReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote_newer" => Ok(SupersedeReason::RemoteNewer),
            "local_newer" => Ok(SupersedeReason::LocalNewer),
            "remote_deleted" => Ok(SupersedeReason::RemoteDeleted),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown supersede reason: {other}"
            ))),
        }
    }
}

/// A losing version of a record, retained for recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersededEdit {
    pub id: SupersededId,
    /// Record the losing version belonged to
    pub record_id: RecordId,
    pub parent_ref: Option<RecordId>,
    pub payload: Payload,
    /// `updated_at` of the losing version
    pub loser_updated_at: DateTime<Utc>,
    /// `updated_at` of the version that won
    pub winner_updated_at: DateTime<Utc>,
    pub reason: SupersedeReason,
    /// New id the local edit continues under (resurrections only)
    pub replacement_id: Option<RecordId>,
    pub recorded_at: DateTime<Utc>,
}

impl SupersededEdit {
    /// Creates an entry for a losing version
    pub fn new(
        record_id: RecordId,
        parent_ref: Option<RecordId>,
        payload: Payload,
        loser_updated_at: DateTime<Utc>,
        winner_updated_at: DateTime<Utc>,
        reason: SupersedeReason,
    ) -> Self {
        Self {
            id: SupersededId::new(),
            record_id,
            parent_ref,
            payload,
            loser_updated_at: truncate_millis(loser_updated_at),
            winner_updated_at: truncate_millis(winner_updated_at),
            reason,
            replacement_id: None,
            recorded_at: now_millis(),
        }
    }

    /// Sets the id the edit was resurrected under
    pub fn with_replacement(mut self, replacement_id: RecordId) -> Self {
        self.replacement_id = Some(replacement_id);
        self
    }

    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }
}
