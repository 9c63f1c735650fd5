//! Scheduler loop: initial run, triggers and shutdown

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use redstone_sync::SyncScheduler;

use crate::common::*;

async fn wait_for_pulls(remote: &FakeRemote, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while remote.changes_calls.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler did not run in time");
}

#[tokio::test]
async fn test_scheduler_runs_on_start_and_on_trigger() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    let orchestrator = Arc::new(orchestrator(&store, &remote, &fast_config()));
    let (scheduler, trigger) = SyncScheduler::new(orchestrator, Duration::from_secs(3600));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));

    wait_for_pulls(&remote, 1).await;
    assert!(trigger.request());
    wait_for_pulls(&remote, 2).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert!(!trigger.request());
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_run() {
    let store = open_store().await;
    let remote = FakeRemote::new();
    remote.gate_changes();
    let orchestrator = Arc::new(orchestrator(&store, &remote, &fast_config()));
    let (scheduler, _trigger) =
        SyncScheduler::new(Arc::clone(&orchestrator), Duration::from_secs(3600));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    wait_for_pulls(&remote, 1).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert_eq!(store.get_cursor().await.unwrap(), None);
    assert_eq!(orchestrator.state(), redstone_sync::SyncState::Idle);
}
