//! Sync runs against the HTTP remote store and a wiremock server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redstone_api::{ApiClient, HttpRemoteStore};
use redstone_core::domain::{Payload, Record, SyncCursor};
use redstone_core::ports::{AlwaysOnline, ILocalStore, IRemoteStore, StaticCredentials};
use redstone_sync::{RunOutcome, SyncOrchestrator};

use crate::common::*;

const TOKEN: &str = "test-jwt-token";
const SYNCED_AT: &str = "2026-01-01T10:00:00.000Z";

fn http_orchestrator(server: &MockServer, store: &Arc<dyn ILocalStore>) -> SyncOrchestrator {
    let client = ApiClient::with_base_url(
        format!("{}/api", server.uri()),
        Arc::new(StaticCredentials::new(TOKEN)),
    );
    let remote: Arc<dyn IRemoteStore> = Arc::new(HttpRemoteStore::new(client));
    SyncOrchestrator::new(Arc::clone(store), remote, Arc::new(AlwaysOnline), &fast_config())
}

fn empty_sync_body() -> serde_json::Value {
    serde_json::json!({
        "files": { "upserted": [], "deleted": [] },
        "folders": { "upserted": [], "deleted": [] },
        "syncedAt": SYNCED_AT
    })
}

#[tokio::test]
async fn test_http_run_pushes_and_advances_cursor() {
    let server = MockServer::start().await;
    let store = open_store().await;
    let local = Record::new_local(id("f1"), None, Payload::file("A", "A body"), Utc::now()).unwrap();
    store.upsert(&local).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/api/files"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "file": {
                "id": "f1",
                "title": "A",
                "content": "A body",
                "folderId": null,
                "createdAt": "2026-01-01T09:00:00.000Z",
                "updatedAt": "2026-01-01T09:30:00.000Z",
                "deletedAt": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_sync_body()))
        .mount(&server)
        .await;

    let outcome = http_orchestrator(&server, &store)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(report.pushed, 1);
    assert_eq!(report.cursor, SyncCursor::new(SYNCED_AT).unwrap());
    let stored = store.get(&id("f1")).await.unwrap().unwrap();
    assert!(!stored.is_dirty());
    // The server's timestamp replaces the one from this device's clock
    assert_eq!(
        stored.updated_at(),
        "2026-01-01T09:30:00Z".parse::<DateTime<Utc>>().unwrap()
    );
    assert_eq!(
        store.get_cursor().await.unwrap(),
        Some(SyncCursor::new(SYNCED_AT).unwrap())
    );
}

#[tokio::test]
async fn test_http_unauthorized_stops_run() {
    let server = MockServer::start().await;
    let store = open_store().await;

    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({ "error": "expired" })),
        )
        .mount(&server)
        .await;

    let orchestrator = http_orchestrator(&server, &store);
    let err = orchestrator.run(&CancellationToken::new()).await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(orchestrator.state(), redstone_sync::SyncState::Idle);
}
