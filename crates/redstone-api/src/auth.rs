//! Authentication: password login and keyring-backed credentials
//!
//! This module provides:
//! - [`login`] - Exchanges email and password for a bearer token
//! - [`KeyringCredentialStore`] - Stores the token in the system keyring and
//!   serves it to the API client through [`ICredentialProvider`]

use anyhow::{Context, Result};
use redstone_core::ports::ICredentialProvider;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::ApiError;

/// Keyring service name for stored tokens
const KEYRING_SERVICE: &str = "redstone";

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Account returned by a successful login
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `POST /auth/login`
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AccountInfo,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Logs in with email and password
///
/// The request is sent without an Authorization header.
pub async fn login(
    client: &ApiClient,
    email: &str,
    password: &str,
) -> Result<LoginResponse, ApiError> {
    debug!(email, "Logging in");
    let builder = client
        .unauthenticated(Method::POST, "/auth/login")
        .json(&LoginRequest { email, password });

    let response: LoginResponse = client.send_json(builder).await?;
    info!(email = %response.user.email, "Login succeeded");
    Ok(response)
}

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores and retrieves the bearer token from the system keyring
///
/// Uses the `keyring` crate (GNOME Keyring, KDE Wallet, macOS Keychain).
/// The entry is keyed by the service name "redstone" and the account email.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    username: String,
}

impl KeyringCredentialStore {
    /// Creates a store for the given account email
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.username)
            .context("Failed to create keyring entry")
    }

    /// Stores the token, replacing any previous one
    pub fn store(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keyring")?;
        debug!(user = %self.username, "Stored token in keyring");
        Ok(())
    }

    /// Loads the token, `None` if no entry exists
    pub fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.username, "No token found in keyring");
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to read token from keyring"),
        }
    }

    /// Removes the token; removing a missing entry is not an error
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(user = %self.username, "Removed token from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                warn!(user = %self.username, "No token to remove from keyring");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to delete token from keyring"),
        }
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for KeyringCredentialStore {
    async fn bearer_token(&self) -> Result<Option<String>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .context("Keyring lookup task failed")?
    }
}
