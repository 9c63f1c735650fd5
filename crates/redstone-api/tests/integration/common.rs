//! Shared test helpers for REST API integration tests
//!
//! Provides wiremock-based mock server setup. Each helper mounts the
//! endpoints a test needs and returns a store pointing at the mock server.

use std::sync::Arc;

use chrono::Utc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redstone_api::{ApiClient, HttpRemoteStore};
use redstone_core::domain::{Payload, Record, RecordId};
use redstone_core::ports::StaticCredentials;

/// Token every mock expects in the Authorization header
pub const TEST_TOKEN: &str = "test-jwt-token";

/// Starts a mock server and returns a (MockServer, HttpRemoteStore) tuple
pub async fn setup_api_mock() -> (MockServer, HttpRemoteStore) {
    let server = MockServer::start().await;
    let client = ApiClient::with_base_url(
        format!("{}/api", server.uri()),
        Arc::new(StaticCredentials::new(TEST_TOKEN)),
    );
    (server, HttpRemoteStore::new(client))
}

/// A server-side file body
pub fn file_json(id: &str, title: &str, updated_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "content": format!("{title} body"),
        "folderId": null,
        "userId": "user-1",
        "createdAt": "2026-01-01T09:00:00.000Z",
        "updatedAt": updated_at,
        "deletedAt": null
    })
}

/// A server-side folder body
pub fn folder_json(id: &str, name: &str, updated_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "parentId": null,
        "createdAt": "2026-01-01T09:00:00.000Z",
        "updatedAt": updated_at,
        "deletedAt": null
    })
}

/// A dirty local file that was never pushed
pub fn local_file(id: &str, title: &str) -> Record {
    Record::new_local(
        RecordId::new(id).unwrap(),
        None,
        Payload::file(title, format!("{title} body")),
        Utc::now(),
    )
    .unwrap()
}

/// Mounts `GET /api/sync` returning the given body
pub async fn mount_sync(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a route answering with a bare status and JSON error body
pub async fn mount_error(server: &MockServer, http_method: &str, route: &str, status: u16) {
    Mock::given(method(http_method))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(serde_json::json!({ "error": format!("status {status}") })),
        )
        .mount(server)
        .await;
}
