//! Wiring shared by the commands: configuration, local store and adapters

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use redstone_api::{ApiClient, HttpRemoteStore, KeyringCredentialStore, TcpConnectivityProbe};
use redstone_cache::{DatabasePool, SqliteLocalStore};
use redstone_core::config::Config;
use redstone_core::ports::{
    ICredentialProvider, IConnectivity, ILocalStore, IRemoteStore, StaticCredentials,
};
use redstone_sync::SyncOrchestrator;

/// Loaded configuration plus the path it came from
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
}

impl AppContext {
    /// Loads the configuration; a missing file yields the defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Config::default_path);
        let config = if config_path.exists() {
            Config::load(&config_path)?
        } else {
            Config::default()
        };
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Account email; fails when nobody is logged in
    pub fn user(&self) -> Result<&str> {
        self.config
            .auth
            .user
            .as_deref()
            .filter(|user| !user.trim().is_empty())
            .context("Not logged in. Run 'redstone auth login' first")
    }

    /// Opens the local replica of the logged-in account
    pub async fn open_store(&self) -> Result<Arc<dyn ILocalStore>> {
        let user = self.user()?;
        let db = DatabasePool::new(&self.config.storage.database)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database {}",
                    self.config.storage.database.display()
                )
            })?;
        let store = SqliteLocalStore::open(db.pool().clone(), user).await?;
        Ok(Arc::new(store))
    }

    /// Token source: the configured override, else the system keyring
    pub fn credentials(&self) -> Result<Arc<dyn ICredentialProvider>> {
        if let Some(token) = self.config.auth.token.as_deref() {
            return Ok(Arc::new(StaticCredentials::new(token)));
        }
        Ok(Arc::new(KeyringCredentialStore::new(self.user()?)))
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config.remote, self.credentials()?)
    }

    pub fn remote(&self) -> Result<Arc<dyn IRemoteStore>> {
        Ok(Arc::new(HttpRemoteStore::new(self.api_client()?)))
    }

    pub fn connectivity(&self) -> Result<Arc<dyn IConnectivity>> {
        let probe = TcpConnectivityProbe::from_base_url(
            &self.config.remote.base_url,
            self.config.remote.connect_timeout(),
        )?;
        Ok(Arc::new(probe))
    }

    /// Builds an orchestrator over the real adapters
    pub async fn orchestrator(&self) -> Result<SyncOrchestrator> {
        let store = self.open_store().await?;
        Ok(SyncOrchestrator::new(
            store,
            self.remote()?,
            self.connectivity()?,
            &self.config,
        ))
    }
}
