//! Convergence and durability properties of the sync engine

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use redstone_core::domain::{Payload, Record, RecordKind, RemoteRevision, SyncCursor};
use redstone_core::ports::{
    ChangeSet, ILocalStore, IRemoteStore, RecordFilter, RemoteError, RemoteRecord, RemoteResult,
};
use redstone_core::usecases::ChangeTracker;
use redstone_sync::retry::RetryPolicy;
use redstone_sync::{PullEngine, PushEngine, RunOutcome, SyncError, SyncState};

use crate::common::*;

#[tokio::test]
async fn test_replayed_create_produces_one_remote_record() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));

    let created = tracker.create_file("A", "", None).await.unwrap();
    remote.lose_next_response();

    let report = sync(&orchestrator(&store, &remote, &fast_config())).await;
    assert_eq!(report.pushed, 1);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    assert_eq!(remote.live_count(), 1);
    assert!(!store.get(created.id()).await.unwrap().unwrap().is_dirty());
}

#[tokio::test]
async fn test_edits_survive_failing_runs() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    for title in ["one", "two", "three"] {
        tracker.create_file(title, "", None).await.unwrap();
    }

    remote.fail_always(Some(RemoteError::Server {
        status: 503,
        message: "maintenance".to_string(),
    }));
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 503, .. }));
    assert!(matches!(
        orchestrator.state(),
        SyncState::Backoff { failures: 1, .. }
    ));
    assert_eq!(store.list_dirty().await.unwrap().len(), 3);
    assert_eq!(store.get_cursor().await.unwrap(), None);

    remote.fail_always(None);
    let report = sync(&orchestrator).await;
    assert_eq!(report.pushed, 3);
    assert!(store.list_dirty().await.unwrap().is_empty());
    assert_eq!(remote.live_count(), 3);
    assert_eq!(orchestrator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_edit_after_lost_create_response_reaches_server() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let remote_port: Arc<dyn IRemoteStore> = remote.clone();
    let push = PushEngine::new(Arc::clone(&store), remote_port, RetryPolicy::once());

    let created = Record::new_local(id("f1"), None, file("A"), at(10)).unwrap();
    store.upsert(&created).await.unwrap();

    // The server commits the create but the response never arrives
    remote.lose_next_response();
    let first = push.push(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.deferred, 1);
    assert_eq!(remote.get(&id("f1")).unwrap().payload, file("A"));

    edit_at(&store, "f1", "B", 20).await;
    let second = push.push(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.pushed, 1);
    assert_eq!(second.deferred, 0);

    sync(&orchestrator(&store, &remote, &fast_config())).await;

    let local = store.get(&id("f1")).await.unwrap().unwrap();
    assert_eq!(local.payload(), &file("B"));
    assert!(!local.is_dirty());
    assert_eq!(remote.get(&id("f1")).unwrap().payload, file("B"));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clean_replica_follows_remote_despite_clock_skew() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    // This device's clock runs ahead of the one that edits next
    let created = Record::new_local(id("f1"), None, file("A"), at(100)).unwrap();
    store.upsert(&created).await.unwrap();
    sync(&orchestrator).await;

    let written = remote.write_from_other_device("f1", file("C"), at(50));
    let report = sync(&orchestrator).await;
    assert_eq!(report.pulled, 1);

    let local = store.get(&id("f1")).await.unwrap().unwrap();
    assert_eq!(local.payload(), &file("C"));
    assert_eq!(local.remote_revision(), Some(&written.revision));
    assert_eq!(local.updated_at(), at(50));
    assert!(!local.is_dirty());
}

/// Remote store that answers every pull with the same change set
struct ReplayRemote {
    changes: ChangeSet,
}

#[async_trait::async_trait]
impl IRemoteStore for ReplayRemote {
    async fn create(&self, record: &Record) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::NotFound(record.id().to_string()))
    }

    async fn update(
        &self,
        record: &Record,
        _if_match: &RemoteRevision,
    ) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::NotFound(record.id().to_string()))
    }

    async fn delete(
        &self,
        _kind: RecordKind,
        record_id: &redstone_core::domain::RecordId,
    ) -> RemoteResult<()> {
        Err(RemoteError::NotFound(record_id.to_string()))
    }

    async fn fetch(
        &self,
        _kind: RecordKind,
        record_id: &redstone_core::domain::RecordId,
    ) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::NotFound(record_id.to_string()))
    }

    async fn changes_since(&self, _cursor: &SyncCursor) -> RemoteResult<ChangeSet> {
        Ok(self.changes.clone())
    }
}

fn remote_version(raw_id: &str, payload: Payload, parent: Option<&str>, secs: i64) -> RemoteRecord {
    RemoteRecord {
        id: id(raw_id),
        parent_ref: parent.map(id),
        payload,
        created_at: at(0),
        updated_at: at(secs),
        deleted_at: None,
        revision: RemoteRevision::from_timestamp(at(secs)),
    }
}

/// Remote store that refuses every update yet reports the revision it refused
struct StaleConflictRemote {
    server: RemoteRecord,
}

#[async_trait::async_trait]
impl IRemoteStore for StaleConflictRemote {
    async fn create(&self, record: &Record) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::NotFound(record.id().to_string()))
    }

    async fn update(
        &self,
        _record: &Record,
        if_match: &RemoteRevision,
    ) -> RemoteResult<RemoteRecord> {
        Err(RemoteError::Conflict(format!("{if_match} refused")))
    }

    async fn delete(
        &self,
        _kind: RecordKind,
        _record_id: &redstone_core::domain::RecordId,
    ) -> RemoteResult<()> {
        Ok(())
    }

    async fn fetch(
        &self,
        _kind: RecordKind,
        _record_id: &redstone_core::domain::RecordId,
    ) -> RemoteResult<RemoteRecord> {
        Ok(self.server.clone())
    }

    async fn changes_since(&self, _cursor: &SyncCursor) -> RemoteResult<ChangeSet> {
        Ok(ChangeSet::empty(SyncCursor::epoch()))
    }
}

#[tokio::test]
async fn test_conflict_without_new_revision_counts_as_deferred() {
    let store = open_store().await;
    let server = remote_version("f1", file("A"), None, 1);
    store.upsert(&server.clone().into_record()).await.unwrap();
    edit_at(&store, "f1", "B", 3).await;

    let remote: Arc<dyn IRemoteStore> = Arc::new(StaleConflictRemote { server });
    let push = PushEngine::new(Arc::clone(&store), remote, RetryPolicy::once());

    let summary = push.push(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.conflicts, 0);
    assert!(store.get(&id("f1")).await.unwrap().unwrap().is_dirty());
}

#[tokio::test]
async fn test_pulling_the_same_batch_twice_changes_nothing() {
    let store = open_store().await;

    // A dirty local edit the batch conflicts with
    store
        .upsert(&remote_version("f3", file("A"), None, 1).into_record())
        .await
        .unwrap();
    edit_at(&store, "f3", "B", 3).await;

    let mut changes = ChangeSet::empty(SyncCursor::new(at(100).to_rfc3339()).unwrap());
    changes
        .folders
        .upserted
        .push(remote_version("d1", Payload::folder("Docs"), None, 2));
    changes
        .files
        .upserted
        .push(remote_version("f1", file("Inside"), Some("d1"), 2));
    changes
        .files
        .upserted
        .push(remote_version("f3", file("C"), None, 4));
    changes.files.deleted.push(id("f2"));

    let remote: Arc<dyn IRemoteStore> = Arc::new(ReplayRemote { changes });
    let pull = PullEngine::new(Arc::clone(&store), remote, RetryPolicy::once());
    let cancel = CancellationToken::new();

    let first = pull.pull(&cancel).await.unwrap();
    assert_eq!(first.pulled, 3);
    assert_eq!(first.conflicts, 1);
    assert!(first.advanced);

    let everything = RecordFilter::new().including_tombstoned();
    let records = store.list(&everything).await.unwrap();
    let superseded = store.list_superseded(None).await.unwrap();
    let stats = store.stats().await.unwrap();

    let second = pull.pull(&cancel).await.unwrap();
    assert_eq!(second.pulled, 0);
    assert_eq!(second.conflicts, 0);
    assert!(!second.advanced);

    assert_eq!(store.list(&everything).await.unwrap(), records);
    assert_eq!(store.list_superseded(None).await.unwrap().len(), superseded.len());
    assert_eq!(store.stats().await.unwrap(), stats);
    assert!(store.is_retired(&id("f2")).await.unwrap());
}

/// Both replicas edit r1; the one with the later edit wins on both
async fn converge(first_pusher_is_older: bool) {
    let remote = FakeRemote::new();
    let config = fast_config();
    let older_store = open_store().await;
    let newer_store = open_store().await;
    let older = orchestrator(&older_store, &remote, &config);
    let newer = orchestrator(&newer_store, &remote, &config);

    remote.write_from_other_device("r1", file("base"), at(1));
    sync(&older).await;
    sync(&newer).await;

    edit_at(&older_store, "r1", "t1", 10).await;
    edit_at(&newer_store, "r1", "t2", 20).await;

    if first_pusher_is_older {
        sync(&older).await;
        sync(&newer).await;
    } else {
        sync(&newer).await;
        sync(&older).await;
    }
    sync(&older).await;
    sync(&newer).await;

    for store in [&older_store, &newer_store] {
        let record = store.get(&id("r1")).await.unwrap().unwrap();
        assert_eq!(record.payload(), &file("t2"));
        assert!(!record.is_dirty());
    }
    assert_eq!(remote.get(&id("r1")).unwrap().payload, file("t2"));
}

#[tokio::test]
async fn test_replicas_converge_when_older_edit_pushes_first() {
    converge(true).await;
}

#[tokio::test]
async fn test_replicas_converge_when_newer_edit_pushes_first() {
    converge(false).await;
}

#[tokio::test]
async fn test_synced_tombstone_is_never_revived() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    let created = tracker.create_file("A", "", None).await.unwrap();
    sync(&orchestrator).await;
    tracker.delete(created.id()).await.unwrap();
    sync(&orchestrator).await;

    // A misbehaving peer writes the id again
    remote.write_from_other_device(created.id().as_str(), file("ghost"), at(1_000_000_000));
    sync(&orchestrator).await;

    let local = store.get(created.id()).await.unwrap().unwrap();
    assert!(local.is_tombstoned());
    assert!(!local.is_dirty());
    assert!(tracker
        .edit_file(created.id(), Some("again"), None)
        .await
        .is_err());

    // Recreating yields a new id
    let recreated = tracker.create_file("A", "", None).await.unwrap();
    assert_ne!(recreated.id(), created.id());
}

#[tokio::test]
async fn test_cancelled_run_leaves_edits_dirty() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());
    tracker.create_file("A", "", None).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = orchestrator.run(&cancel).await.unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(store.list_dirty().await.unwrap().len(), 1);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 0);
    assert_eq!(store.get_cursor().await.unwrap(), None);
}
