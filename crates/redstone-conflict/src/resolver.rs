//! Conflict resolution executor
//!
//! Applies merge plans to the local store. Every plan touching an existing
//! record is committed as one [`MergeBatch`] guarded on the `updated_at`
//! that was read, so a local edit racing the merge either lands before the
//! read (and is seen) or after the commit (and wins the next round). A
//! guard failure re-reads and re-plans.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use redstone_core::domain::{
    now_millis, Record, RecordId, RecordKind, SupersedeReason, SupersededEdit,
};
use redstone_core::ports::{ILocalStore, MergeBatch, RecordFilter, RemoteRecord, TombstoneOrigin};

use crate::detector::{plan_delete, plan_upsert, DeletePlan, UpsertPlan};
use crate::error::ConflictError;

/// Times a merge is re-planned after a concurrent local edit
const MAX_MERGE_ATTEMPTS: u32 = 3;

/// What a merge did to the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Remote version written (new, or a new revision of a clean local copy)
    Applied,
    /// Nothing changed: revision already applied or a dead id
    Unchanged,
    /// Same content on both sides; dirty cleared
    Converged,
    /// Dirty local lost; its payload is kept as a superseded edit
    RemoteWon,
    /// Dirty local won; it stays dirty with the remote revision adopted
    LocalWon,
    /// Remote deletion applied to the local copy
    Tombstoned,
    /// Remote deletion of an id never seen here; id retired
    Retired,
    /// Remote deletion of a dirty record; the edit lives on under `new_id`
    Resurrected { new_id: RecordId },
}

impl MergeOutcome {
    /// True when the local store was left in conflict-resolved state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MergeOutcome::RemoteWon | MergeOutcome::LocalWon | MergeOutcome::Resurrected { .. }
        )
    }
}

/// Applies merge plans to the local store
pub struct ConflictResolver {
    store: Arc<dyn ILocalStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn ILocalStore>) -> Self {
        Self { store }
    }

    /// Merges a remote upsert
    ///
    /// A remote version that carries a `deleted_at` is merged as a deletion.
    pub async fn merge_upsert(&self, remote: &RemoteRecord) -> Result<MergeOutcome, ConflictError> {
        if remote.deleted_at.is_some() {
            return self.merge_delete(remote.kind(), &remote.id).await;
        }

        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let local = self.store.get(&remote.id).await?;
            let retired = match local {
                Some(_) => false,
                None => self.store.is_retired(&remote.id).await?,
            };

            let plan = plan_upsert(local.as_ref(), retired, remote);
            if let Some(outcome) = self.apply_upsert_plan(plan, local, remote).await? {
                return Ok(outcome);
            }
            debug!(record_id = %remote.id, attempt, "Merge raced a local edit, re-planning");
        }

        warn!(record_id = %remote.id, "Giving up merge after repeated concurrent edits");
        Err(ConflictError::Contended {
            record_id: remote.id.to_string(),
            attempts: MAX_MERGE_ATTEMPTS,
        })
    }

    /// Merges a remote deletion
    pub async fn merge_delete(
        &self,
        kind: RecordKind,
        id: &RecordId,
    ) -> Result<MergeOutcome, ConflictError> {
        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let local = self.store.get(id).await?;
            if let Some(record) = &local {
                if record.kind() != kind {
                    warn!(
                        record_id = %id,
                        local_kind = %record.kind(),
                        remote_kind = %kind,
                        "Remote deletion kind mismatch"
                    );
                }
            }

            let plan = plan_delete(local.as_ref());
            if let Some(outcome) = self.apply_delete_plan(plan, local, id).await? {
                return Ok(outcome);
            }
            debug!(record_id = %id, attempt, "Remote delete raced a local edit, re-planning");
        }

        warn!(record_id = %id, "Giving up remote delete after repeated concurrent edits");
        Err(ConflictError::Contended {
            record_id: id.to_string(),
            attempts: MAX_MERGE_ATTEMPTS,
        })
    }

    /// Returns `None` when the store rejected the batch and a re-plan is needed
    async fn apply_upsert_plan(
        &self,
        plan: UpsertPlan,
        local: Option<Record>,
        remote: &RemoteRecord,
    ) -> Result<Option<MergeOutcome>, ConflictError> {
        let (batch, outcome) = match (plan, local) {
            (UpsertPlan::Skip | UpsertPlan::IgnoreDead, _) => {
                return Ok(Some(MergeOutcome::Unchanged));
            }
            (UpsertPlan::Materialize, None) => (
                MergeBatch::new().upsert(remote.clone().into_record()),
                MergeOutcome::Applied,
            ),
            (UpsertPlan::Materialize, Some(local)) => (
                MergeBatch::new()
                    .guard(&local)
                    .upsert(remote.clone().into_record()),
                MergeOutcome::Applied,
            ),
            (UpsertPlan::Converge, Some(local)) => (
                MergeBatch::new()
                    .guard(&local)
                    .upsert(remote.clone().into_record()),
                MergeOutcome::Converged,
            ),
            (UpsertPlan::RemoteWins, Some(local)) => {
                let loser = SupersededEdit::new(
                    local.id().clone(),
                    local.parent_ref().cloned(),
                    local.payload().clone(),
                    local.updated_at(),
                    remote.updated_at,
                    SupersedeReason::RemoteNewer,
                );
                (
                    MergeBatch::new()
                        .guard(&local)
                        .upsert(remote.clone().into_record())
                        .supersede(loser),
                    MergeOutcome::RemoteWon,
                )
            }
            (UpsertPlan::LocalWins, Some(local)) => {
                let loser = SupersededEdit::new(
                    remote.id.clone(),
                    remote.parent_ref.clone(),
                    remote.payload.clone(),
                    remote.updated_at,
                    local.updated_at(),
                    SupersedeReason::LocalNewer,
                );
                let mut kept = local.clone();
                kept.adopt_revision(remote.revision.clone());
                (
                    MergeBatch::new().guard(&local).upsert(kept).supersede(loser),
                    MergeOutcome::LocalWon,
                )
            }
            // Conflict plans are only produced for an existing local record
            (_, None) => return Ok(None),
        };

        if !self.store.apply_merge(&batch).await? {
            return Ok(None);
        }

        match &outcome {
            MergeOutcome::RemoteWon | MergeOutcome::LocalWon => info!(
                record_id = %remote.id,
                ?outcome,
                "Resolved conflicting edit, losing version kept for recovery"
            ),
            _ => debug!(record_id = %remote.id, ?outcome, "Merged remote upsert"),
        }
        Ok(Some(outcome))
    }

    async fn apply_delete_plan(
        &self,
        plan: DeletePlan,
        local: Option<Record>,
        id: &RecordId,
    ) -> Result<Option<MergeOutcome>, ConflictError> {
        let now = now_millis();
        match (plan, local) {
            (DeletePlan::Skip, _) => Ok(Some(MergeOutcome::Unchanged)),
            (DeletePlan::Retire, _) => {
                self.store.retire_id(id).await?;
                debug!(record_id = %id, "Retired remotely deleted id");
                Ok(Some(MergeOutcome::Retired))
            }
            (DeletePlan::Tombstone, Some(local)) if local.is_tombstoned() => {
                // Pending local delete already done remotely: just settle it
                let applied = self
                    .store
                    .mark_tombstone(id, now, TombstoneOrigin::Remote)
                    .await?;
                Ok(applied.then_some(MergeOutcome::Tombstoned))
            }
            (DeletePlan::Tombstone, Some(local)) => {
                let batch = MergeBatch::new().guard(&local).remote_tombstone(id.clone(), now);
                if !self.store.apply_merge(&batch).await? {
                    return Ok(None);
                }
                debug!(record_id = %id, "Applied remote deletion");
                Ok(Some(MergeOutcome::Tombstoned))
            }
            (DeletePlan::Resurrect, Some(local)) => self.resurrect(local, now).await,
            (_, None) => Ok(None),
        }
    }

    /// Keeps an unsynced edit of a remotely deleted record under a new id
    async fn resurrect(
        &self,
        local: Record,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<MergeOutcome>, ConflictError> {
        let new_id = RecordId::generate();
        let revived = local.resurrect_as(new_id.clone(), now);
        let entry = SupersededEdit::new(
            local.id().clone(),
            local.parent_ref().cloned(),
            local.payload().clone(),
            local.updated_at(),
            now,
            SupersedeReason::RemoteDeleted,
        )
        .with_replacement(new_id.clone());

        let mut batch = MergeBatch::new()
            .guard(&local)
            .upsert(revived)
            .remote_tombstone(local.id().clone(), now)
            .supersede(entry);

        if local.kind() == RecordKind::Folder {
            let children = self
                .store
                .list(&RecordFilter::new().with_parent(Some(local.id().clone())))
                .await?;
            for child in children {
                let mut moved = child.clone();
                moved.set_parent(Some(new_id.clone()), now)?;
                batch = batch.guard(&child).upsert(moved);
            }
        }

        if !self.store.apply_merge(&batch).await? {
            return Ok(None);
        }

        info!(
            record_id = %local.id(),
            new_id = %new_id,
            "Remote deleted a record with unsynced edits, kept the edit under a new id"
        );
        Ok(Some(MergeOutcome::Resurrected { new_id }))
    }
}
