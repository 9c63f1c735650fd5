//! Conflict recovery use cases
//!
//! Superseded edits are the losing sides of resolved conflicts. These use
//! cases let the user inspect them, bring one back as a new local edit, or
//! drop it.

use std::sync::Arc;

use tracing::info;

use redstone_core::domain::{Record, RecordId, SupersededEdit, SupersededId};
use redstone_core::ports::ILocalStore;
use redstone_core::usecases::ChangeTracker;

use crate::error::ConflictError;

/// Lists, restores and discards superseded edits
pub struct ConflictRecovery {
    store: Arc<dyn ILocalStore>,
    tracker: ChangeTracker,
}

impl ConflictRecovery {
    pub fn new(store: Arc<dyn ILocalStore>) -> Self {
        Self {
            tracker: ChangeTracker::new(Arc::clone(&store)),
            store,
        }
    }

    /// Superseded edits, newest first, optionally for one record
    pub async fn list(
        &self,
        record: Option<&RecordId>,
    ) -> Result<Vec<SupersededEdit>, ConflictError> {
        Ok(self.store.list_superseded(record).await?)
    }

    pub async fn show(&self, id: &SupersededId) -> Result<SupersededEdit, ConflictError> {
        self.store
            .get_superseded(id)
            .await?
            .ok_or_else(|| ConflictError::NotFound(id.to_string()))
    }

    /// Re-applies a superseded payload as a new local edit
    ///
    /// The edit goes through the change tracker, so it is dirty and will be
    /// pushed on the next sync. The entry is removed once restored.
    pub async fn restore(&self, id: &SupersededId) -> Result<Record, ConflictError> {
        self.show(id).await?;
        Ok(self.tracker.restore_superseded(id).await?)
    }

    /// Drops a superseded edit
    pub async fn discard(&self, id: &SupersededId) -> Result<(), ConflictError> {
        if !self.store.delete_superseded(id).await? {
            return Err(ConflictError::NotFound(id.to_string()));
        }
        info!(superseded_id = %id, "Superseded edit discarded");
        Ok(())
    }
}
