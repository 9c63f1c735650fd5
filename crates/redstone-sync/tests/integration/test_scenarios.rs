//! The four reference sync scenarios

use std::sync::atomic::Ordering;
use std::sync::Arc;

use redstone_core::domain::SupersedeReason;
use redstone_core::ports::{ILocalStore, RecordFilter};
use redstone_core::usecases::ChangeTracker;

use crate::common::*;

#[tokio::test]
async fn test_offline_create_is_pushed_on_sync() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));

    let created = tracker.create_file("A", "first draft", None).await.unwrap();
    assert!(created.is_dirty());

    let report = sync(&orchestrator(&store, &remote, &fast_config())).await;
    assert_eq!(report.pushed, 1);
    assert!(!report.is_degraded());

    let server = remote.get(created.id()).expect("record on the server");
    assert_eq!(server.payload, created.payload().clone());

    let local = store.get(created.id()).await.unwrap().unwrap();
    assert!(!local.is_dirty());
    assert_eq!(local.remote_revision(), Some(&server.revision));
}

#[tokio::test]
async fn test_newer_remote_edit_wins_and_local_edit_is_kept_for_recovery() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    remote.write_from_other_device("f1", file("A"), at(1));
    sync(&orchestrator).await;

    edit_at(&store, "f1", "B", 3).await;
    remote.write_from_other_device("f1", file("C"), at(4));

    let report = sync(&orchestrator).await;
    assert_eq!(report.conflicts, 1);

    let local = store.get(&id("f1")).await.unwrap().unwrap();
    assert_eq!(local.payload(), &file("C"));
    assert!(!local.is_dirty());

    let superseded = store.list_superseded(Some(&id("f1"))).await.unwrap();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].payload, file("B"));
    assert_eq!(superseded[0].reason, SupersedeReason::RemoteNewer);

    // The losing edit never reached the server
    assert_eq!(remote.get(&id("f1")).unwrap().payload, file("C"));
}

#[tokio::test]
async fn test_offline_delete_is_issued_once() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let tracker = ChangeTracker::new(Arc::clone(&store));
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    let created = tracker.create_file("A", "", None).await.unwrap();
    sync(&orchestrator).await;

    assert!(tracker.delete(created.id()).await.unwrap());
    let pending = store.get(created.id()).await.unwrap().unwrap();
    assert!(pending.is_tombstoned());
    assert!(pending.is_dirty());

    let report = sync(&orchestrator).await;
    assert_eq!(report.deleted_remotely, 1);
    assert!(remote.is_deleted(created.id()));

    let local = store.get(created.id()).await.unwrap().unwrap();
    assert!(local.is_tombstoned());
    assert!(!local.is_dirty());

    sync(&orchestrator).await;
    assert_eq!(remote.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remote_delete_of_unsynced_edit_resurrects_under_new_id() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = orchestrator(&store, &remote, &fast_config());

    remote.write_from_other_device("f1", file("A"), at(1));
    sync(&orchestrator).await;

    edit_at(&store, "f1", "B", 3).await;
    remote.delete_from_other_device("f1");

    let report = sync(&orchestrator).await;
    assert_eq!(report.resurrected, 1);

    let old = store.get(&id("f1")).await.unwrap().unwrap();
    assert!(old.is_tombstoned());
    assert!(!old.is_dirty());

    let live = store.list(&RecordFilter::new()).await.unwrap();
    assert_eq!(live.len(), 1);
    let revived = &live[0];
    assert_ne!(revived.id(), &id("f1"));
    assert_eq!(revived.payload(), &file("B"));

    // The copy goes out on the next run
    let report = sync(&orchestrator).await;
    assert_eq!(report.pushed, 1);
    assert_eq!(remote.get(revived.id()).unwrap().payload, file("B"));
    assert!(remote.is_deleted(&id("f1")));
}
