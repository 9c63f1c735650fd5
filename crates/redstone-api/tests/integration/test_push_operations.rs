//! Create, update, delete and fetch against the mock API

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use redstone_core::domain::{RecordId, RecordKind, RemoteRevision};
use redstone_core::ports::{IRemoteStore, RemoteError};

use crate::common::{file_json, folder_json, local_file, mount_error, setup_api_mock, TEST_TOKEN};

#[tokio::test]
async fn test_create_posts_client_id_with_bearer() {
    let (server, store) = setup_api_mock().await;
    let record = local_file("0190a1b2-file-0001", "Groceries");

    Mock::given(method("POST"))
        .and(path("/api/files"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .and(body_partial_json(serde_json::json!({
            "id": "0190a1b2-file-0001",
            "title": "Groceries"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "file": file_json("0190a1b2-file-0001", "Groceries", "2026-03-01T12:00:00.000Z")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = store.create(&record).await.unwrap();
    assert_eq!(created.id, *record.id());
    assert_eq!(created.revision.as_str(), "2026-03-01T12:00:00.000Z");
}

#[tokio::test]
async fn test_replayed_create_returns_existing_record() {
    let (server, store) = setup_api_mock().await;
    let record = local_file("f-replayed", "Draft");

    mount_error(&server, "POST", "/api/files", 409).await;
    Mock::given(method("GET"))
        .and(path("/api/files/f-replayed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": file_json("f-replayed", "Draft", "2026-03-01T12:00:00.000Z")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let existing = store.create(&record).await.unwrap();
    assert_eq!(existing.id.as_str(), "f-replayed");
}

#[tokio::test]
async fn test_replayed_create_with_newer_edit_is_conflict() {
    let (server, store) = setup_api_mock().await;
    // Created as "Draft" earlier, edited offline before the retry
    let record = local_file("f-replayed", "Final");

    mount_error(&server, "POST", "/api/files", 409).await;
    Mock::given(method("GET"))
        .and(path("/api/files/f-replayed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": file_json("f-replayed", "Draft", "2026-03-01T12:00:00.000Z")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = store.create(&record).await.unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)));
}

#[tokio::test]
async fn test_update_sends_if_match() {
    let (server, store) = setup_api_mock().await;
    let record = local_file("f1", "Edited");

    Mock::given(method("PUT"))
        .and(path("/api/files/f1"))
        .and(header("if-match", "rev-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": {
                "id": "f1",
                "title": "Edited",
                "content": "Edited body",
                "folderId": null,
                "createdAt": "2026-01-01T09:00:00.000Z",
                "updatedAt": "2026-03-02T08:00:00.000Z",
                "revision": "rev-8"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updated = store
        .update(&record, &RemoteRevision::new("rev-7").unwrap())
        .await
        .unwrap();
    assert_eq!(updated.revision.as_str(), "rev-8");
}

#[tokio::test]
async fn test_update_precondition_failed_is_conflict() {
    let (server, store) = setup_api_mock().await;
    mount_error(&server, "PUT", "/api/files/f1", 412).await;

    let err = store
        .update(&local_file("f1", "X"), &RemoteRevision::new("old").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)));
}

#[tokio::test]
async fn test_delete_and_missing_delete() {
    let (server, store) = setup_api_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/api/folders/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_error(&server, "DELETE", "/api/files/gone", 404).await;

    store
        .delete(RecordKind::Folder, &RecordId::new("d1").unwrap())
        .await
        .unwrap();

    let err = store
        .delete(RecordKind::File, &RecordId::new("gone").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
}

#[tokio::test]
async fn test_fetch_folder() {
    let (server, store) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/folders/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "folder": folder_json("d1", "Work", "2026-02-01T00:00:00.000Z")
        })))
        .mount(&server)
        .await;

    let folder = store
        .fetch(RecordKind::Folder, &RecordId::new("d1").unwrap())
        .await
        .unwrap();
    assert_eq!(folder.kind(), RecordKind::Folder);
    assert_eq!(folder.payload.label(), "Work");
}
