//! Local mutation tracking use case
//!
//! Every user-initiated create, edit, move or delete goes through the
//! [`ChangeTracker`]. It validates the mutation, assigns client-generated
//! ids, bumps `updated_at` and marks the record dirty so the next sync run
//! pushes it. Deletes become dirty tombstones.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::domain::{
    now_millis, DomainError, Payload, Record, RecordId, RecordKind, SupersededId,
};
use crate::ports::{ILocalStore, TombstoneOrigin};

/// Longest parent chain accepted before the tree is considered corrupt
const MAX_FOLDER_DEPTH: usize = 256;

/// Attempts at re-applying an edit that raced with a concurrent merge
const MAX_EDIT_ATTEMPTS: usize = 3;

/// Use case for local mutations of files and folders
pub struct ChangeTracker {
    store: Arc<dyn ILocalStore>,
}

impl ChangeTracker {
    pub fn new(store: Arc<dyn ILocalStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a file, optionally inside a folder
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ValidationFailed`] for an empty title and
    /// [`DomainError::InvalidParent`] if `folder` is not a live folder.
    pub async fn create_file(
        &self,
        title: &str,
        content: &str,
        folder: Option<&RecordId>,
    ) -> Result<Record> {
        self.create(Payload::file(title, content), folder).await
    }

    /// Creates a folder, optionally inside another folder
    pub async fn create_folder(&self, name: &str, parent: Option<&RecordId>) -> Result<Record> {
        self.create(Payload::folder(name), parent).await
    }

    async fn create(&self, payload: Payload, parent: Option<&RecordId>) -> Result<Record> {
        payload.validate()?;
        if let Some(parent) = parent {
            self.ensure_live_folder(parent).await?;
        }

        let record = Record::new_local(RecordId::generate(), parent.cloned(), payload, now_millis())?;
        let applied = self
            .store
            .upsert(&record)
            .await
            .context("Failed to store new record")?;
        if !applied {
            anyhow::bail!("Freshly generated id {} was rejected by the store", record.id());
        }

        info!(record_id = %record.id(), kind = %record.kind(), "Record created");
        Ok(record)
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Changes the title and/or content of a file
    ///
    /// Fields passed as `None` are left unchanged.
    pub async fn edit_file(
        &self,
        id: &RecordId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Record> {
        self.apply_edit(id, |record| {
            let (old_title, old_content) = match record.payload() {
                Payload::File { title, content } => (title.clone(), content.clone()),
                Payload::Folder { .. } => {
                    return Err(DomainError::ValidationFailed(format!(
                        "{} is a folder, not a file",
                        record.id()
                    )))
                }
            };
            let payload = Payload::file(
                title.map(str::to_string).unwrap_or(old_title),
                content.map(str::to_string).unwrap_or(old_content),
            );
            record.set_payload(payload, now_millis())
        })
        .await
    }

    /// Renames a folder
    pub async fn rename_folder(&self, id: &RecordId, name: &str) -> Result<Record> {
        let payload = Payload::folder(name);
        payload.validate()?;
        self.apply_edit(id, |record| {
            if record.kind() != RecordKind::Folder {
                return Err(DomainError::ValidationFailed(format!(
                    "{} is a file, not a folder",
                    record.id()
                )));
            }
            record.set_payload(payload.clone(), now_millis())
        })
        .await
    }

    /// Moves a file or folder under `new_parent` (`None` for the root)
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Cycle`] when a folder would end up inside
    /// itself or one of its descendants.
    pub async fn move_record(&self, id: &RecordId, new_parent: Option<&RecordId>) -> Result<Record> {
        if let Some(parent) = new_parent {
            if parent == id {
                return Err(DomainError::Cycle(format!("cannot move {id} into itself")).into());
            }
            self.ensure_live_folder(parent).await?;
            self.ensure_not_ancestor(id, parent).await?;
        }

        self.apply_edit(id, |record| {
            if record.parent_ref() == new_parent {
                return Ok(());
            }
            record.set_parent(new_parent.cloned(), now_millis())
        })
        .await
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Deletes a record by setting its tombstone
    ///
    /// Deleting an already deleted record is a no-op. Children of a deleted
    /// folder are left as they are; each record is deleted on its own.
    /// Returns true if a tombstone was set.
    pub async fn delete(&self, id: &RecordId) -> Result<bool> {
        let record = self.require(id).await?;
        if record.is_tombstoned() {
            debug!(record_id = %id, "Record already deleted");
            return Ok(false);
        }

        let applied = self
            .store
            .mark_tombstone(id, now_millis(), TombstoneOrigin::Local)
            .await
            .context("Failed to tombstone record")?;
        if applied {
            info!(record_id = %id, "Record deleted");
        }
        Ok(applied)
    }

    // ========================================================================
    // Conflict recovery
    // ========================================================================

    /// Re-applies a superseded version as a new local edit
    ///
    /// When the record is still live, the superseded payload replaces its
    /// current one. When it was deleted, the payload is recreated under a
    /// fresh id (at the root if the old parent is gone). The superseded
    /// entry is removed afterwards.
    pub async fn restore_superseded(&self, superseded_id: &SupersededId) -> Result<Record> {
        let edit = self
            .store
            .get_superseded(superseded_id)
            .await
            .context("Failed to load superseded edit")?
            .ok_or_else(|| DomainError::NotFound(superseded_id.to_string()))?;

        let target = edit.replacement_id.as_ref().unwrap_or(&edit.record_id);
        let live_target = match self.store.get(target).await? {
            Some(record) if !record.is_tombstoned() && record.kind() == edit.kind() => Some(record),
            _ => None,
        };

        let restored = match live_target {
            Some(record) => {
                let payload = edit.payload.clone();
                self.apply_edit(record.id(), |r| r.set_payload(payload.clone(), now_millis()))
                    .await?
            }
            None => {
                let mut parent = edit.parent_ref.as_ref();
                if let Some(p) = parent {
                    if self.ensure_live_folder(p).await.is_err() {
                        parent = None;
                    }
                }
                self.create(edit.payload.clone(), parent).await?
            }
        };

        self.store
            .delete_superseded(superseded_id)
            .await
            .context("Failed to remove restored superseded edit")?;
        info!(
            superseded_id = %superseded_id,
            record_id = %restored.id(),
            "Superseded edit restored"
        );
        Ok(restored)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn require(&self, id: &RecordId) -> Result<Record> {
        let record = self
            .store
            .get(id)
            .await
            .context("Failed to load record")?
            .ok_or_else(|| DomainError::NotFound(id.to_string()))?;
        Ok(record)
    }

    /// Reads, mutates and stores a record
    ///
    /// The store rejects the write when a merge stored a newer version in
    /// the meantime; the edit is then re-applied on top of that version.
    async fn apply_edit<F>(&self, id: &RecordId, mut edit: F) -> Result<Record>
    where
        F: FnMut(&mut Record) -> Result<(), DomainError>,
    {
        for attempt in 1..=MAX_EDIT_ATTEMPTS {
            let original = self.require(id).await?;
            let mut record = original.clone();
            edit(&mut record)?;
            if record == original {
                return Ok(record);
            }

            if self
                .store
                .upsert(&record)
                .await
                .context("Failed to store edited record")?
            {
                debug!(record_id = %id, updated_at = %record.updated_at(), "Record edited");
                return Ok(record);
            }
            debug!(record_id = %id, attempt, "Edit raced with a concurrent write, retrying");
        }
        anyhow::bail!("Record {id} kept changing concurrently; edit not applied")
    }

    async fn ensure_live_folder(&self, id: &RecordId) -> Result<()> {
        match self.store.get(id).await.context("Failed to load parent")? {
            Some(parent) if parent.kind() == RecordKind::Folder && !parent.is_tombstoned() => Ok(()),
            Some(parent) if parent.is_tombstoned() => {
                Err(DomainError::InvalidParent(format!("folder {id} is deleted")).into())
            }
            Some(_) => Err(DomainError::InvalidParent(format!("{id} is not a folder")).into()),
            None => Err(DomainError::InvalidParent(format!("folder {id} does not exist")).into()),
        }
    }

    /// Walks up from `new_parent` and fails if `id` is one of its ancestors
    async fn ensure_not_ancestor(&self, id: &RecordId, new_parent: &RecordId) -> Result<()> {
        let mut current = Some(new_parent.clone());
        let mut depth = 0;
        while let Some(cursor) = current {
            if &cursor == id {
                return Err(DomainError::Cycle(format!(
                    "cannot move {id} into its own descendant {new_parent}"
                ))
                .into());
            }
            depth += 1;
            if depth > MAX_FOLDER_DEPTH {
                return Err(DomainError::Cycle(format!(
                    "folder chain above {new_parent} exceeds {MAX_FOLDER_DEPTH} levels"
                ))
                .into());
            }
            current = self
                .store
                .get(&cursor)
                .await?
                .and_then(|r| r.parent_ref().cloned());
        }
        Ok(())
    }
}
