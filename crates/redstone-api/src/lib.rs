//! Redstone API - HTTP remote store adapter
//!
//! Provides async client for:
//! - The notes REST API (`/files`, `/folders`, `/sync`)
//! - Password login against `/auth/login`
//! - Bearer credential storage in the system keyring
//! - A TCP reachability probe used as the connectivity gate
//!
//! ## Modules
//!
//! - [`client`] - Typed HTTP client with status classification
//! - [`wire`] - camelCase JSON shapes exchanged with the server
//! - [`provider`] - `IRemoteStore` implementation
//! - [`auth`] - Login flow and keyring-backed credentials
//! - [`connectivity`] - `IConnectivity` implementation
//! - [`rate_limit`] - `Retry-After` parsing

pub mod auth;
pub mod client;
pub mod connectivity;
pub mod provider;
pub mod rate_limit;
pub mod wire;

pub use auth::{login, KeyringCredentialStore, LoginResponse};
pub use client::ApiClient;
pub use connectivity::TcpConnectivityProbe;
pub use provider::HttpRemoteStore;

use std::time::Duration;

use redstone_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur when talking to the REST API
#[derive(Debug, Error)]
pub enum ApiError {
    /// No bearer credential is available
    #[error("Not logged in")]
    MissingCredentials,

    /// 401/403: the credential was rejected
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// 404/410: the resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// 409/412: a precondition or uniqueness check failed
    #[error("Conflict ({status}): {message}")]
    Conflict { status: u16, message: String },

    /// 429: rate limit exceeded
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Delay requested by the server, if it sent one
        retry_after: Option<Duration>,
    },

    /// 408, 425 and 5xx
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other 4xx
    #[error("Bad request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The credential lookup itself failed (e.g. keyring unavailable)
    #[error("Credential lookup failed: {0}")]
    Credentials(String),
}

impl ApiError {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ApiError::Unauthorized { status, message },
            404 | 410 => ApiError::NotFound(message),
            409 | 412 => ApiError::Conflict { status, message },
            429 => ApiError::TooManyRequests { retry_after },
            408 | 425 | 500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::BadRequest { status, message },
        }
    }
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::MissingCredentials | ApiError::Credentials(_) => {
                RemoteError::Auth { status: 401 }
            }
            ApiError::Unauthorized { status, .. } => RemoteError::Auth { status },
            ApiError::NotFound(message) => RemoteError::NotFound(message),
            ApiError::Conflict { message, .. } => RemoteError::Conflict(message),
            ApiError::TooManyRequests { retry_after } => RemoteError::RateLimited { retry_after },
            ApiError::ServerError { status, message } => RemoteError::Server { status, message },
            ApiError::BadRequest { status, message } => RemoteError::Rejected { status, message },
            ApiError::NetworkError(e) if e.is_timeout() => RemoteError::Timeout,
            ApiError::NetworkError(e) if e.is_decode() => {
                RemoteError::InvalidResponse(e.to_string())
            }
            ApiError::NetworkError(e) => RemoteError::Network(e.to_string()),
            ApiError::InvalidResponse(message) => RemoteError::InvalidResponse(message),
        }
    }
}
