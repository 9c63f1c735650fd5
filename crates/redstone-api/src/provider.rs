//! HttpRemoteStore - IRemoteStore implementation for the notes REST API
//!
//! Wraps the [`ApiClient`] and maps the record-level port operations onto
//! the `/files`, `/folders` and `/sync` routes.
//!
//! ## Design Notes
//!
//! - The client-generated id is sent in the create body; the server keys
//!   the record on it, so a replayed create is recognised. A 409 on create
//!   means the id already exists and the existing record is returned.
//! - Updates carry the last acknowledged revision in `If-Match`.
//! - Adapter errors are converted into the port's closed [`RemoteError`]
//!   taxonomy at this boundary.

use reqwest::header::IF_MATCH;
use reqwest::Method;
use tracing::{debug, info, instrument};

use redstone_core::domain::{Record, RecordId, RecordKind, RemoteRevision, SyncCursor};
use redstone_core::ports::{ChangeSet, IRemoteStore, RemoteError, RemoteRecord, RemoteResult};

use crate::client::ApiClient;
use crate::wire::{FileEnvelope, FolderEnvelope, RecordBody, SyncResponseDto};
use crate::ApiError;

/// Collection route for a record kind
fn collection(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::File => "/files",
        RecordKind::Folder => "/folders",
    }
}

fn item_path(kind: RecordKind, id: &RecordId) -> String {
    format!("{}/{}", collection(kind), id.as_str())
}

/// `IRemoteStore` backed by the REST API
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: ApiClient,
}

impl HttpRemoteStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Sends a request and decodes the single-record envelope for `kind`
    async fn send_record(
        &self,
        kind: RecordKind,
        builder: reqwest::RequestBuilder,
    ) -> Result<RemoteRecord, ApiError> {
        match kind {
            RecordKind::File => {
                let envelope: FileEnvelope = self.client.send_json(builder).await?;
                envelope.file.try_into()
            }
            RecordKind::Folder => {
                let envelope: FolderEnvelope = self.client.send_json(builder).await?;
                envelope.folder.try_into()
            }
        }
    }

    async fn get_record(&self, kind: RecordKind, id: &RecordId) -> Result<RemoteRecord, ApiError> {
        let builder = self.client.request(Method::GET, &item_path(kind, id)).await?;
        self.send_record(kind, builder).await
    }
}

#[async_trait::async_trait]
impl IRemoteStore for HttpRemoteStore {
    #[instrument(skip(self, record), fields(record_id = %record.id(), kind = %record.kind()))]
    async fn create(&self, record: &Record) -> RemoteResult<RemoteRecord> {
        let kind = record.kind();
        let builder = self
            .client
            .request(Method::POST, collection(kind))
            .await?
            .json(&RecordBody::from_record(record));

        match self.send_record(kind, builder).await {
            Ok(created) => {
                debug!(revision = %created.revision, "Created remote record");
                Ok(created)
            }
            Err(ApiError::Conflict { .. }) => {
                let existing = self.get_record(kind, record.id()).await?;
                if existing.same_content(record) {
                    info!("Record already exists remotely, treating create as replayed");
                    return Ok(existing);
                }
                // Created earlier and edited since: push must merge and update
                info!(revision = %existing.revision, "Record exists remotely with other content");
                Err(RemoteError::Conflict(format!(
                    "record {} already exists at revision {}",
                    record.id(),
                    existing.revision
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, record), fields(record_id = %record.id(), kind = %record.kind()))]
    async fn update(
        &self,
        record: &Record,
        if_match: &RemoteRevision,
    ) -> RemoteResult<RemoteRecord> {
        let kind = record.kind();
        let builder = self
            .client
            .request(Method::PUT, &item_path(kind, record.id()))
            .await?
            .header(IF_MATCH, if_match.as_str())
            .json(&RecordBody::from_record(record));

        let updated = self.send_record(kind, builder).await?;
        debug!(revision = %updated.revision, "Updated remote record");
        Ok(updated)
    }

    #[instrument(skip(self), fields(record_id = %id))]
    async fn delete(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<()> {
        let builder = self
            .client
            .request(Method::DELETE, &item_path(kind, id))
            .await?;
        self.client.send_empty(builder).await?;
        debug!("Deleted remote record");
        Ok(())
    }

    async fn fetch(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<RemoteRecord> {
        Ok(self.get_record(kind, id).await?)
    }

    #[instrument(skip(self), fields(since = %cursor))]
    async fn changes_since(&self, cursor: &SyncCursor) -> RemoteResult<ChangeSet> {
        let builder = self
            .client
            .request(Method::GET, "/sync")
            .await?
            .query(&[("since", cursor.as_str())]);

        let dto: SyncResponseDto = self.client.send_json(builder).await?;
        let changes = ChangeSet::try_from(dto).map_err(RemoteError::from)?;

        debug!(
            changes = changes.len(),
            synced_at = %changes.synced_at,
            "Fetched remote changes"
        );
        Ok(changes)
    }
}
