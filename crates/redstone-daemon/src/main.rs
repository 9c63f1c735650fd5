//! Redstone Daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Periodic sync runs against the notes server
//! - Immediate runs on SIGUSR1
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite replica and the HTTP adapters into a
//! `SyncOrchestrator` and hands it to a `SyncScheduler`. The scheduler is
//! controlled by a `CancellationToken` that is triggered on receipt of
//! SIGTERM or SIGINT; an in-flight run is cancelled and leaves the cursor
//! untouched.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use redstone_api::{ApiClient, HttpRemoteStore, KeyringCredentialStore, TcpConnectivityProbe};
use redstone_cache::{DatabasePool, SqliteLocalStore};
use redstone_core::config::Config;
use redstone_core::ports::{ICredentialProvider, StaticCredentials};
use redstone_sync::{SyncOrchestrator, SyncScheduler, SyncTrigger};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file path
const CONFIG_ENV: &str = "REDSTONE_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the scheduler and the token that stops it
struct DaemonService {
    scheduler: SyncScheduler,
    trigger: SyncTrigger,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the replica of the configured account and builds the adapters
    async fn new(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            for err in &errors {
                error!(field = %err.field, message = %err.message, "Invalid configuration");
            }
            anyhow::bail!("Configuration has {} invalid field(s)", errors.len());
        }

        let user = config
            .auth
            .user
            .as_deref()
            .context("No account configured. Run 'redstone auth login' first")?;

        let db = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteLocalStore::open(db.pool().clone(), user).await?);

        let credentials: Arc<dyn ICredentialProvider> = match config.auth.token.as_deref() {
            Some(token) => Arc::new(StaticCredentials::new(token)),
            None => Arc::new(KeyringCredentialStore::new(user)),
        };
        let client = ApiClient::new(&config.remote, credentials)?;
        let remote = Arc::new(HttpRemoteStore::new(client));
        let connectivity = Arc::new(TcpConnectivityProbe::from_base_url(
            &config.remote.base_url,
            config.remote.connect_timeout(),
        )?);

        let orchestrator = Arc::new(SyncOrchestrator::new(store, remote, connectivity, config));
        let (scheduler, trigger) =
            SyncScheduler::new(orchestrator, config.sync.poll_interval());

        info!(
            user,
            server = %config.remote.base_url,
            database = %config.storage.database.display(),
            "Daemon service initialized"
        );
        Ok(Self {
            scheduler,
            trigger,
            shutdown,
        })
    }

    /// Runs until the shutdown token fires
    async fn run(self) {
        let requests = tokio::spawn(forward_sync_requests(
            self.trigger.clone(),
            self.shutdown.clone(),
        ));
        self.scheduler.run(self.shutdown.clone()).await;
        requests.abort();
    }
}

/// Turns SIGUSR1 into immediate sync requests
#[cfg(unix)]
async fn forward_sync_requests(trigger: SyncTrigger, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(usr1) => usr1,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGUSR1 handler");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = usr1.recv() => {
                if received.is_none() || !trigger.request() {
                    break;
                }
                info!("Sync requested via SIGUSR1");
            }
        }
    }
}

#[cfg(not(unix))]
async fn forward_sync_requests(_trigger: SyncTrigger, shutdown: CancellationToken) {
    shutdown.cancelled().await;
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

fn config_path(env_value: Option<OsString>) -> PathBuf {
    env_value
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path(std::env::var_os(CONFIG_ENV));
    let config = load_config(&path)?;
    init_tracing(&config);

    info!(config_path = %path.display(), "Redstone daemon starting (redstoned)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let result = match DaemonService::new(&config, shutdown_token.clone()).await {
        Ok(service) => {
            service.run().await;
            Ok(())
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => info!("Redstone daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Redstone daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
