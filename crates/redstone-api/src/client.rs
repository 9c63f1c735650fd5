//! REST API client
//!
//! Provides a typed HTTP client for the notes API. Handles the bearer
//! header, per-request timeouts, JSON (de)serialization and classification
//! of error statuses into [`ApiError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use redstone_api::client::ApiClient;
//! use redstone_core::ports::StaticCredentials;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), redstone_api::ApiError> {
//! let client = ApiClient::with_base_url(
//!     "http://localhost:3000/api",
//!     Arc::new(StaticCredentials::new("jwt")),
//! );
//! let body: serde_json::Value = client
//!     .send_json(client.request(Method::GET, "/folders").await?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use redstone_core::config::RemoteConfig;
use redstone_core::ports::ICredentialProvider;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::rate_limit::retry_after_from_headers;
use crate::ApiError;

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 200;

/// Error body shape used by the server: `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client for the notes REST API
///
/// Cheap to clone: the underlying `reqwest::Client` and the credential
/// provider are shared.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without trailing slash, e.g. `http://localhost:3000/api`
    base_url: String,
    /// Source of the bearer token, consulted on every request
    credentials: Arc<dyn ICredentialProvider>,
}

impl ApiClient {
    /// Creates a client from configuration, applying its timeouts
    pub fn new(config: &RemoteConfig, credentials: Arc<dyn ICredentialProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("redstone/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Creates a client with default reqwest settings (useful for testing)
    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: Arc<dyn ICredentialProvider>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Fails with [`ApiError::MissingCredentials`] when no token is available.
    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self
            .credentials
            .bearer_token()
            .await
            .map_err(|e| ApiError::Credentials(format!("{e:#}")))?
            .ok_or(ApiError::MissingCredentials)?;

        Ok(self.unauthenticated(method, path).bearer_auth(token))
    }

    /// Creates a request builder without the Authorization header
    pub fn unauthenticated(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url)
    }

    /// Sends a request and decodes a JSON response body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = Self::checked(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Sends a request whose response body is ignored
    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        Self::checked(builder.send().await?).await?;
        Ok(())
    }

    /// Passes success responses through and classifies everything else
    async fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), url = %response.url(), "Request succeeded");
            return Ok(response);
        }

        let retry_after = retry_after_from_headers(response.headers());
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        warn!(status = status.as_u16(), url = %url, message = %message, "Request failed");
        Err(ApiError::from_status(status.as_u16(), message, retry_after))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Extracts a human-readable message from an error body
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message) {
            return message;
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}
