//! Login flow

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use redstone_api::{login, ApiError};

use crate::common::{mount_error, setup_api_mock};

#[tokio::test]
async fn test_login_returns_token_and_account() {
    let (server, store) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(serde_json::json!({
            "email": "ada@example.com",
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "fresh-jwt",
            "user": {
                "id": "user-1",
                "email": "ada@example.com",
                "name": "Ada",
                "createdAt": "2026-01-01T00:00:00.000Z",
                "updatedAt": "2026-01-01T00:00:00.000Z"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = login(store.client(), "ada@example.com", "hunter2")
        .await
        .unwrap();
    assert_eq!(response.token, "fresh-jwt");
    assert_eq!(response.user.id, "user-1");
    assert_eq!(response.user.name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_login_bad_password() {
    let (server, store) = setup_api_mock().await;
    mount_error(&server, "POST", "/api/auth/login", 401).await;

    let err = login(store.client(), "ada@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { status: 401, .. }));
}
