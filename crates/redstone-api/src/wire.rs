//! JSON shapes exchanged with the REST API
//!
//! Field names follow the server's camelCase convention. Unknown fields
//! (tags, owner ids, nested folder summaries) are ignored on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use redstone_core::domain::{
    truncate_millis, Payload, Record, RecordId, RemoteRevision, SyncCursor,
};
use redstone_core::ports::{ChangeSet, Changes, RemoteRecord};

use crate::ApiError;

// ============================================================================
// Records
// ============================================================================

/// A file as sent and returned by `/files`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// A folder as sent and returned by `/folders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Single-file response body
#[derive(Debug, Deserialize)]
pub struct FileEnvelope {
    pub file: FileDto,
}

/// Single-folder response body
#[derive(Debug, Deserialize)]
pub struct FolderEnvelope {
    pub folder: FolderDto,
}

/// Request body for create and update, tagged by record kind
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecordBody {
    File(FileDto),
    Folder(FolderDto),
}

impl RecordBody {
    /// Builds the request body for a local record
    pub fn from_record(record: &Record) -> Self {
        let id = record.id().to_string();
        let parent = record.parent_ref().map(|p| p.to_string());
        let revision = record.remote_revision().map(|r| r.to_string());

        match record.payload() {
            Payload::File { title, content } => RecordBody::File(FileDto {
                id,
                title: title.clone(),
                content: Some(content.clone()),
                folder_id: parent,
                created_at: record.created_at(),
                updated_at: record.updated_at(),
                deleted_at: record.deleted_at(),
                revision,
            }),
            Payload::Folder { name } => RecordBody::Folder(FolderDto {
                id,
                name: name.clone(),
                parent_id: parent,
                created_at: record.created_at(),
                updated_at: record.updated_at(),
                deleted_at: record.deleted_at(),
                revision,
            }),
        }
    }
}

fn record_id(raw: String, field: &str) -> Result<RecordId, ApiError> {
    RecordId::new(raw).map_err(|e| ApiError::InvalidResponse(format!("{field}: {e}")))
}

fn revision(raw: Option<String>, updated_at: DateTime<Utc>) -> Result<RemoteRevision, ApiError> {
    match raw {
        Some(token) => RemoteRevision::new(token)
            .map_err(|e| ApiError::InvalidResponse(format!("revision: {e}"))),
        None => Ok(RemoteRevision::from_timestamp(updated_at)),
    }
}

impl TryFrom<FileDto> for RemoteRecord {
    type Error = ApiError;

    fn try_from(dto: FileDto) -> Result<Self, Self::Error> {
        let updated_at = truncate_millis(dto.updated_at);
        Ok(RemoteRecord {
            id: record_id(dto.id, "id")?,
            parent_ref: dto.folder_id.map(|p| record_id(p, "folderId")).transpose()?,
            payload: Payload::file(dto.title, dto.content.unwrap_or_default()),
            created_at: truncate_millis(dto.created_at),
            updated_at,
            deleted_at: dto.deleted_at.map(truncate_millis),
            revision: revision(dto.revision, updated_at)?,
        })
    }
}

impl TryFrom<FolderDto> for RemoteRecord {
    type Error = ApiError;

    fn try_from(dto: FolderDto) -> Result<Self, Self::Error> {
        let updated_at = truncate_millis(dto.updated_at);
        Ok(RemoteRecord {
            id: record_id(dto.id, "id")?,
            parent_ref: dto.parent_id.map(|p| record_id(p, "parentId")).transpose()?,
            payload: Payload::folder(dto.name),
            created_at: truncate_millis(dto.created_at),
            updated_at,
            deleted_at: dto.deleted_at.map(truncate_millis),
            revision: revision(dto.revision, updated_at)?,
        })
    }
}

// ============================================================================
// Sync
// ============================================================================

/// Upserts and deleted ids for one kind
#[derive(Debug, Deserialize)]
pub struct ChangesDto<T> {
    #[serde(default = "Vec::new")]
    pub upserted: Vec<T>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl<T> Default for ChangesDto<T> {
    fn default() -> Self {
        Self {
            upserted: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

/// Response of `GET /sync?since=`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponseDto {
    #[serde(default)]
    pub files: ChangesDto<FileDto>,
    #[serde(default)]
    pub folders: ChangesDto<FolderDto>,
    pub synced_at: String,
}

fn into_changes<T>(dto: ChangesDto<T>) -> Result<Changes, ApiError>
where
    T: TryInto<RemoteRecord, Error = ApiError>,
{
    let upserted = dto
        .upserted
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<Vec<_>, _>>()?;
    let deleted = dto
        .deleted
        .into_iter()
        .map(|id| record_id(id, "deleted"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Changes { upserted, deleted })
}

impl TryFrom<SyncResponseDto> for ChangeSet {
    type Error = ApiError;

    fn try_from(dto: SyncResponseDto) -> Result<Self, Self::Error> {
        let synced_at = SyncCursor::new(dto.synced_at)
            .map_err(|e| ApiError::InvalidResponse(format!("syncedAt: {e}")))?;
        Ok(ChangeSet {
            files: into_changes(dto.files)?,
            folders: into_changes(dto.folders)?,
            synced_at,
        })
    }
}
