//! `GET /sync` handling

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use redstone_core::domain::{RecordKind, SyncCursor};
use redstone_core::ports::{IRemoteStore, RemoteError};

use crate::common::{file_json, folder_json, mount_sync, setup_api_mock};

#[tokio::test]
async fn test_changes_since_sends_cursor() {
    let (server, store) = setup_api_mock().await;
    let cursor = SyncCursor::new("2026-03-01T00:00:00.000Z").unwrap();

    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .and(query_param("since", "2026-03-01T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": {
                "upserted": [file_json("f1", "A", "2026-03-01T10:00:00.000Z")],
                "deleted": ["f2"]
            },
            "folders": {
                "upserted": [folder_json("d1", "Work", "2026-03-01T09:00:00.000Z")],
                "deleted": []
            },
            "syncedAt": "2026-03-01T10:00:05.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let changes = store.changes_since(&cursor).await.unwrap();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes.files.upserted[0].kind(), RecordKind::File);
    assert_eq!(changes.folders.upserted[0].kind(), RecordKind::Folder);
    assert_eq!(changes.files.deleted[0].as_str(), "f2");
    assert!(changes.synced_at.is_after(&cursor));
}

#[tokio::test]
async fn test_initial_pull_uses_epoch() {
    let (server, store) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .and(query_param("since", SyncCursor::epoch().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": { "upserted": [], "deleted": [] },
            "folders": { "upserted": [], "deleted": [] },
            "syncedAt": "2026-03-01T10:00:05.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let changes = store.changes_since(&SyncCursor::epoch()).await.unwrap();
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_missing_sections_default_to_empty() {
    let (server, store) = setup_api_mock().await;
    mount_sync(
        &server,
        serde_json::json!({ "syncedAt": "2026-03-01T10:00:05.000Z" }),
    )
    .await;

    let changes = store.changes_since(&SyncCursor::epoch()).await.unwrap();
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_malformed_sync_body_is_invalid_response() {
    let (server, store) = setup_api_mock().await;
    mount_sync(&server, serde_json::json!({ "files": [] })).await;

    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}
