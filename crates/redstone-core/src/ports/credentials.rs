//! Credential provider port
//!
//! Supplies the bearer credential attached to every remote request.
//!
//! ## Design Notes
//!
//! - The token is looked up per request so that a re-login is picked up
//!   by a long-running daemon without a restart.
//! - `Ok(None)` means "not logged in"; adapters report it as an
//!   authentication failure.

use anyhow::Result;

/// Port trait for bearer credential lookup
#[async_trait::async_trait]
pub trait ICredentialProvider: Send + Sync {
    /// Returns the current bearer token, if any
    async fn bearer_token(&self) -> Result<Option<String>>;
}

/// A fixed token, e.g. from configuration or tests
#[derive(Clone)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider with no credential
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}
