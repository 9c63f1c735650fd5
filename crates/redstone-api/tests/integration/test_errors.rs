//! Status classification as seen through the IRemoteStore port

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use redstone_api::{ApiClient, HttpRemoteStore};
use redstone_core::domain::SyncCursor;
use redstone_core::ports::{IRemoteStore, RemoteError, StaticCredentials};

use crate::common::{mount_error, setup_api_mock};

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let (server, store) = setup_api_mock().await;
    mount_error(&server, "GET", "/api/sync", 401).await;

    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    assert_eq!(err, RemoteError::Auth { status: 401 });
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (server, store) = setup_api_mock().await;
    mount_error(&server, "GET", "/api/sync", 503).await;

    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (server, store) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn test_bad_request_is_rejected() {
    let (server, store) = setup_api_mock().await;
    mount_error(&server, "GET", "/api/sync", 400).await;

    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    match err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "status 400");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_token_never_reaches_server() {
    let (server, _) = setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let anonymous = HttpRemoteStore::new(ApiClient::with_base_url(
        format!("{}/api", server.uri()),
        Arc::new(StaticCredentials::anonymous()),
    ));
    let err = anonymous
        .changes_since(&SyncCursor::epoch())
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Auth { status: 401 });
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Bind then release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let store = HttpRemoteStore::new(ApiClient::with_base_url(
        format!("http://127.0.0.1:{port}/api"),
        Arc::new(StaticCredentials::new("t")),
    ));
    let err = store.changes_since(&SyncCursor::epoch()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
    assert!(err.is_retryable());
}
