//! Pull engine
//!
//! Fetches everything changed since the stored cursor and merges it into
//! the local store through the conflict resolver. The cursor moves to the
//! server's `syncedAt` only once every item of the batch has merged; any
//! failure or cancellation leaves it where it was, and the items already
//! merged are merged again, harmlessly, on the next pull.
//!
//! Items are merged parents first: folder upserts, file upserts, file
//! deletions, then folder deletions.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use redstone_conflict::{ConflictResolver, MergeOutcome};
use redstone_core::domain::{RecordId, RecordKind, SyncCursor};
use redstone_core::ports::{ChangeSet, ILocalStore, IRemoteStore, RemoteRecord};

use crate::retry::{with_retry, RetryFailure, RetryPolicy};
use crate::SyncError;

/// Counters of one pull pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    /// Remote upserts that changed the local store
    pub pulled: usize,
    /// Remote deletions applied to local records
    pub tombstones_applied: usize,
    /// Conflicting local edits resolved by the merge policy
    pub conflicts: usize,
    /// Edits of remotely deleted records kept under a new id
    pub resurrected: usize,
    /// Cursor after the pass
    pub cursor: SyncCursor,
    /// Whether the stored cursor moved
    pub advanced: bool,
}

impl PullSummary {
    fn new(cursor: SyncCursor) -> Self {
        Self {
            pulled: 0,
            tombstones_applied: 0,
            conflicts: 0,
            resurrected: 0,
            cursor,
            advanced: false,
        }
    }

    fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Applied | MergeOutcome::Converged => self.pulled += 1,
            MergeOutcome::RemoteWon => {
                self.pulled += 1;
                self.conflicts += 1;
            }
            MergeOutcome::LocalWon => self.conflicts += 1,
            MergeOutcome::Tombstoned => self.tombstones_applied += 1,
            MergeOutcome::Resurrected { .. } => {
                self.tombstones_applied += 1;
                self.resurrected += 1;
            }
            MergeOutcome::Unchanged | MergeOutcome::Retired => {}
        }
    }
}

/// Merges remote changes into the local store
pub struct PullEngine {
    store: Arc<dyn ILocalStore>,
    remote: Arc<dyn IRemoteStore>,
    resolver: ConflictResolver,
    policy: RetryPolicy,
}

impl PullEngine {
    pub fn new(
        store: Arc<dyn ILocalStore>,
        remote: Arc<dyn IRemoteStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            resolver: ConflictResolver::new(Arc::clone(&store)),
            store,
            remote,
            policy,
        }
    }

    /// Pulls and merges changes since the stored cursor
    #[instrument(skip_all)]
    pub async fn pull(&self, cancel: &CancellationToken) -> Result<PullSummary, SyncError> {
        let cursor = self
            .store
            .get_cursor()
            .await?
            .unwrap_or_else(SyncCursor::epoch);

        let changes = with_retry("changes", &self.policy, cancel, || {
            self.remote.changes_since(&cursor)
        })
        .await
        .map_err(|failure| match failure {
            RetryFailure::Cancelled => SyncError::Cancelled,
            RetryFailure::Fatal(err) | RetryFailure::Exhausted { last: err, .. } => err.into(),
        })?;

        debug!(since = %cursor, items = changes.len(), "Fetched remote changes");
        let mut summary = PullSummary::new(cursor);
        self.merge_all(&changes, &mut summary, cancel).await?;

        summary.advanced = self.store.advance_cursor(&changes.synced_at).await?;
        if summary.advanced {
            summary.cursor = changes.synced_at;
        }

        info!(
            pulled = summary.pulled,
            tombstones = summary.tombstones_applied,
            conflicts = summary.conflicts,
            resurrected = summary.resurrected,
            cursor = %summary.cursor,
            "Pull pass complete"
        );
        Ok(summary)
    }

    async fn merge_all(
        &self,
        changes: &ChangeSet,
        summary: &mut PullSummary,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        for upserts in [&changes.folders.upserted, &changes.files.upserted] {
            for remote in upserts {
                check_cancelled(cancel)?;
                let outcome = self.merge_upsert(remote).await?;
                summary.record(&outcome);
            }
        }

        let deletions = [
            (RecordKind::File, &changes.files.deleted),
            (RecordKind::Folder, &changes.folders.deleted),
        ];
        for (kind, ids) in deletions {
            for id in ids {
                check_cancelled(cancel)?;
                let outcome = self.merge_delete(kind, id).await?;
                summary.record(&outcome);
            }
        }
        Ok(())
    }

    async fn merge_upsert(&self, remote: &RemoteRecord) -> Result<MergeOutcome, SyncError> {
        let outcome = self.resolver.merge_upsert(remote).await?;
        debug!(record_id = %remote.id, ?outcome, "Merged remote upsert");
        Ok(outcome)
    }

    async fn merge_delete(&self, kind: RecordKind, id: &RecordId) -> Result<MergeOutcome, SyncError> {
        let outcome = self.resolver.merge_delete(kind, id).await?;
        debug!(record_id = %id, ?outcome, "Merged remote deletion");
        Ok(outcome)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
