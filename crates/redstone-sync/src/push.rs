//! Push engine
//!
//! Sends every dirty record to the remote store, oldest `updated_at` first.
//! Each record is handled on its own: a failure defers that record (it
//! stays dirty for the next run) without stopping the pass. Only an
//! authentication failure or cancellation aborts the pass.
//!
//! ## Design Notes
//!
//! - Tombstones become a DELETE; a 404 means the server already forgot the
//!   record and counts as success.
//! - A record without a remote revision is created (POST, idempotent on
//!   the client id); otherwise it is replaced with the stored revision as
//!   `If-Match`.
//! - A revision conflict fetches the server version and merges it through
//!   the conflict resolver, so the following pull does not meet the same
//!   conflict again. When the local edit wins, it is pushed once more with
//!   the adopted revision.
//! - Acknowledgement is guarded on the `updated_at` that was sent: an edit
//!   made while the request was in flight keeps the record dirty.
//! - A failed merge defers only its own record; a storage failure still
//!   ends the pass.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use redstone_conflict::{ConflictError, ConflictResolver, MergeOutcome};
use redstone_core::domain::Record;
use redstone_core::ports::{ILocalStore, IRemoteStore, RemoteError, RemoteRecord};

use crate::retry::{with_retry, RetryFailure, RetryPolicy};
use crate::SyncError;

/// Counters of one push pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    /// Records created or updated remotely
    pub pushed: usize,
    /// Tombstones confirmed by the remote store
    pub deleted: usize,
    /// Revision conflicts resolved by the merge policy
    pub conflicts: usize,
    /// Edits of remotely deleted records kept under a new id
    pub resurrected: usize,
    /// Records left dirty after a failure that retrying did not fix
    pub deferred: usize,
}

impl PushSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Pushed => self.pushed += 1,
            RecordOutcome::Deleted => self.deleted += 1,
            RecordOutcome::Merged(merge) => self.count_merge(merge),
            RecordOutcome::MergedThenPushed(merge) => {
                self.count_merge(merge);
                self.pushed += 1;
            }
            RecordOutcome::Deferred => self.deferred += 1,
        }
    }

    fn count_merge(&mut self, merge: &MergeOutcome) {
        match merge {
            MergeOutcome::Resurrected { .. } => self.resurrected += 1,
            outcome if outcome.is_conflict() => self.conflicts += 1,
            _ => {}
        }
    }
}

/// What happened to one dirty record
#[derive(Debug, Clone, PartialEq, Eq)]
enum RecordOutcome {
    Pushed,
    Deleted,
    /// A conflict was resolved locally; nothing more was sent
    Merged(MergeOutcome),
    /// A conflict was resolved in favour of the local edit, which was then sent
    MergedThenPushed(MergeOutcome),
    Deferred,
}

/// Sends local changes to the remote store
pub struct PushEngine {
    store: Arc<dyn ILocalStore>,
    remote: Arc<dyn IRemoteStore>,
    resolver: ConflictResolver,
    policy: RetryPolicy,
}

impl PushEngine {
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

    /// Pushes every record that is dirty when the pass starts
    ///
    /// Edits made during the pass are picked up by the next one.
    #[instrument(skip_all)]
    pub async fn push(&self, cancel: &CancellationToken) -> Result<PushSummary, SyncError> {
        let dirty = self.store.list_dirty().await?;
        let mut summary = PushSummary::default();
        if dirty.is_empty() {
            debug!("Nothing to push");
            return Ok(summary);
        }

        info!(count = dirty.len(), "Pushing local changes");
        for record in &dirty {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let outcome = self.push_record(record, cancel).await?;
            summary.record(&outcome);
        }

        info!(
            pushed = summary.pushed,
            deleted = summary.deleted,
            conflicts = summary.conflicts,
            deferred = summary.deferred,
            "Push pass complete"
        );
        Ok(summary)
    }

    async fn push_record(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, SyncError> {
        if record.is_tombstoned() {
            return self.push_delete(record, cancel).await;
        }

        match self.send(record, cancel).await {
            Ok(server) => {
                self.acknowledge(record, Some(&server)).await?;
                Ok(RecordOutcome::Pushed)
            }
            Err(RetryFailure::Fatal(RemoteError::Conflict(reason))) => {
                debug!(record_id = %record.id(), %reason, "Push rejected by revision check");
                self.resolve_conflict(record, cancel).await
            }
            Err(RetryFailure::Fatal(RemoteError::NotFound(_))) if !record.is_new() => {
                // The server no longer has it: same as a remote deletion
                match self.resolver.merge_delete(record.kind(), record.id()).await {
                    Ok(merge) => Ok(RecordOutcome::Merged(merge)),
                    Err(err) => merge_failed(record, err),
                }
            }
            Err(failure) => self.defer(record, failure),
        }
    }

    async fn push_delete(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, SyncError> {
        let result = with_retry("delete", &self.policy, cancel, || {
            self.remote.delete(record.kind(), record.id())
        })
        .await;

        match result {
            Ok(()) => {}
            Err(RetryFailure::Fatal(RemoteError::NotFound(_))) => {
                debug!(record_id = %record.id(), "Record already gone remotely");
            }
            Err(failure) => return self.defer(record, failure),
        }

        self.acknowledge(record, None).await?;
        Ok(RecordOutcome::Deleted)
    }

    /// Creates or replaces the record remotely
    async fn send(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RemoteRecord, RetryFailure> {
        match record.remote_revision() {
            None => {
                with_retry("create", &self.policy, cancel, || self.remote.create(record)).await
            }
            Some(revision) => {
                with_retry("update", &self.policy, cancel, || {
                    self.remote.update(record, revision)
                })
                .await
            }
        }
    }

    /// Fetches the server version after a rejected precondition and merges it
    async fn resolve_conflict(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, SyncError> {
        let fetched = with_retry("fetch", &self.policy, cancel, || {
            self.remote.fetch(record.kind(), record.id())
        })
        .await;

        let merged = match fetched {
            Ok(server) => self.resolver.merge_upsert(&server).await,
            Err(RetryFailure::Fatal(RemoteError::NotFound(_))) => {
                self.resolver.merge_delete(record.kind(), record.id()).await
            }
            Err(failure) => return self.defer(record, failure),
        };
        let merge = match merged {
            Ok(merge) => merge,
            Err(err) => return merge_failed(record, err),
        };

        match merge {
            MergeOutcome::LocalWon => {}
            MergeOutcome::Unchanged => {
                // The server refused our revision yet still reports it
                warn!(record_id = %record.id(), "Conflict left the record unchanged, deferring");
                return Ok(RecordOutcome::Deferred);
            }
            other => return Ok(RecordOutcome::Merged(other)),
        }

        // The local edit won and now carries the server's revision
        let Some(current) = self.store.get(record.id()).await? else {
            return Ok(RecordOutcome::Merged(merge));
        };
        if !current.is_dirty() || current.is_tombstoned() {
            return Ok(RecordOutcome::Merged(merge));
        }

        match self.send(&current, cancel).await {
            Ok(server) => {
                self.acknowledge(&current, Some(&server)).await?;
                Ok(RecordOutcome::MergedThenPushed(merge))
            }
            Err(RetryFailure::Fatal(RemoteError::Conflict(_))) => {
                warn!(record_id = %record.id(), "Record changed again remotely, deferring");
                Ok(RecordOutcome::Deferred)
            }
            Err(failure) => self.defer(&current, failure),
        }
    }

    async fn acknowledge(
        &self,
        record: &Record,
        server: Option<&RemoteRecord>,
    ) -> Result<(), SyncError> {
        let cleared = self
            .store
            .acknowledge(record.id(), record.updated_at(), server)
            .await?;
        debug!(record_id = %record.id(), cleared, "Push acknowledged");
        Ok(())
    }

    /// Leaves the record dirty, or aborts the pass when retrying is pointless
    fn defer(&self, record: &Record, failure: RetryFailure) -> Result<RecordOutcome, SyncError> {
        match failure {
            RetryFailure::Cancelled => Err(SyncError::Cancelled),
            RetryFailure::Fatal(RemoteError::Auth { status }) => Err(SyncError::Auth { status }),
            RetryFailure::Fatal(err) => {
                warn!(record_id = %record.id(), error = %err, "Push rejected, record stays dirty");
                Ok(RecordOutcome::Deferred)
            }
            RetryFailure::Exhausted { attempts, last } => {
                warn!(
                    record_id = %record.id(),
                    attempts,
                    error = %last,
                    "Push retries exhausted, record stays dirty"
                );
                Ok(RecordOutcome::Deferred)
            }
        }
    }
}

/// A merge failure defers the record; only a storage failure ends the pass
fn merge_failed(record: &Record, err: ConflictError) -> Result<RecordOutcome, SyncError> {
    match err {
        ConflictError::Storage(err) => Err(SyncError::Storage(err)),
        err => {
            warn!(record_id = %record.id(), error = %err, "Merge failed, record stays dirty");
            Ok(RecordOutcome::Deferred)
        }
    }
}
