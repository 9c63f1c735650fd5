//! Orchestrator state machine and push/pull edge cases

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use redstone_core::config::ConfigBuilder;
use redstone_core::domain::{Record, RecordKind, RecordParts, RemoteRevision};
use redstone_core::ports::{AlwaysOnline, ILocalStore, IRemoteStore, RemoteError};
use redstone_core::usecases::ChangeTracker;
use redstone_sync::retry::RetryPolicy;
use redstone_sync::{PullEngine, RunOutcome, SyncError, SyncOrchestrator, SyncState};

use crate::common::*;

#[tokio::test]
async fn test_offline_run_is_skipped() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let connectivity = FakeConnectivity::new(false);
    let remote_port: Arc<dyn IRemoteStore> = remote.clone();
    let orchestrator =
        SyncOrchestrator::new(store, remote_port, connectivity.clone(), &fast_config());

    let outcome = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Offline);
    assert_eq!(remote.changes_calls.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.state(), SyncState::Idle);

    connectivity.set_online(true);
    let outcome = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn test_auth_failure_returns_to_idle() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    remote.fail_next([RemoteError::Auth { status: 401 }]);
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(orchestrator.state(), SyncState::Idle);

    // No backoff after an auth failure
    assert!(matches!(
        orchestrator.run(&CancellationToken::new()).await.unwrap(),
        RunOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_auth_failure_during_push_aborts_run() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());
    tracker.create_file("A", "", None).await.unwrap();
    tracker.create_file("B", "", None).await.unwrap();

    remote.fail_next([RemoteError::Auth { status: 403 }]);
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SyncError::Auth { status: 403 }));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 0);
    assert_eq!(store.list_dirty().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failure_enters_backoff() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let config = ConfigBuilder::new()
        .sync_push_max_attempts(2)
        .sync_retry_delays_ms(1, 5)
        .sync_run_backoff_secs(3600, 3600)
        .build();
    let orchestrator = orchestrator(&store, &remote, &config);

    let unavailable = RemoteError::Server {
        status: 502,
        message: "bad gateway".to_string(),
    };
    remote.fail_next([unavailable.clone(), unavailable]);
    assert!(orchestrator.run(&CancellationToken::new()).await.is_err());

    let SyncState::Backoff { until, failures } = orchestrator.state() else {
        panic!("expected backoff, got {:?}", orchestrator.state());
    };
    assert_eq!(failures, 1);
    assert!(until <= Utc::now() + chrono::Duration::hours(1));

    let outcome = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::BackingOff { .. }));
    assert_eq!(remote.changes_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_run_is_coalesced() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = Arc::new(orchestrator(&store, &remote, &fast_config()));
    remote.gate_changes();

    let mut state = orchestrator.subscribe();
    let in_flight = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(&CancellationToken::new()).await })
    };
    state
        .wait_for(|state| *state == SyncState::Running)
        .await
        .unwrap();

    let outcome = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Coalesced);

    remote.release_changes();
    let first = in_flight.await.unwrap().unwrap();
    assert!(matches!(first, RunOutcome::Completed(_)));
    assert_eq!(orchestrator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_cancel_during_pull_keeps_cursor() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = Arc::new(orchestrator(&store, &remote, &fast_config()));
    remote.write_from_other_device("f1", file("A"), at(1));
    remote.gate_changes();

    let cancel = CancellationToken::new();
    let mut state = orchestrator.subscribe();
    let in_flight = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(&cancel).await })
    };
    state
        .wait_for(|state| *state == SyncState::Running)
        .await
        .unwrap();

    cancel.cancel();
    let outcome = in_flight.await.unwrap().unwrap();
    remote.release_changes();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(store.get_cursor().await.unwrap(), None);
    assert!(store.get(&id("f1")).await.unwrap().is_none());
    assert_eq!(orchestrator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_rejected_record_is_deferred_and_stays_dirty() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());
    tracker.create_file("A", "", None).await.unwrap();
    tracker.create_file("B", "", None).await.unwrap();

    remote.fail_next([RemoteError::Rejected {
        status: 422,
        message: "title too long".to_string(),
    }]);
    let report = sync(&orchestrator).await;

    assert_eq!(report.deferred, 1);
    assert_eq!(report.pushed, 1);
    assert!(report.is_degraded());
    assert_eq!(store.list_dirty().await.unwrap().len(), 1);
    assert_eq!(remote.live_count(), 1);

    // Retried on the next run
    let report = sync(&orchestrator).await;
    assert_eq!(report.pushed, 1);
    assert!(store.list_dirty().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_tombstones_are_purged_after_run() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let long_ago = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
    let tombstone = Record::from_parts(RecordParts {
        id: id("old"),
        parent_ref: None,
        payload: file("gone"),
        created_at: long_ago,
        updated_at: long_ago,
        deleted_at: Some(long_ago),
        dirty: false,
        remote_revision: Some(RemoteRevision::new("rev-0").unwrap()),
    });
    store.upsert(&tombstone).await.unwrap();

    let report = sync(&orchestrator(&store, &remote, &fast_config())).await;

    assert_eq!(report.purged_tombstones, 1);
    assert!(store.get(&id("old")).await.unwrap().is_none());
    assert!(store.is_retired(&id("old")).await.unwrap());
}

#[tokio::test]
async fn test_pull_resurrects_edit_of_remotely_deleted_record() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    remote.write_from_other_device("f1", file("A"), at(1));
    sync(&orchestrator(&store, &remote, &fast_config())).await;

    edit_at(&store, "f1", "B", 3).await;
    remote.delete_from_other_device("f1");

    let remote_port: Arc<dyn IRemoteStore> = remote.clone();
    let pull = PullEngine::new(Arc::clone(&store), remote_port, RetryPolicy::once());
    let summary = pull.pull(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.resurrected, 1);
    assert!(summary.advanced);
    assert!(store.get(&id("f1")).await.unwrap().unwrap().is_tombstoned());
    let dirty = store.list_dirty().await.unwrap();
    assert_eq!(dirty.len(), 1);
    assert_eq!(dirty[0].payload(), &file("B"));
    assert_eq!(dirty[0].kind(), RecordKind::File);
}

#[tokio::test]
async fn test_always_online_orchestrator_runs() {
    let store = open_store().await;
    let remote: Arc<dyn IRemoteStore> = FakeRemote::new();
    let orchestrator = SyncOrchestrator::new(store, remote, Arc::new(AlwaysOnline), &fast_config());
    assert!(matches!(
        orchestrator.run(&CancellationToken::new()).await.unwrap(),
        RunOutcome::Completed(_)
    ));
}
