//! Configuration module for Redstone.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Redstone.
///
/// Every section falls back to its defaults when absent from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub conflicts: ConflictsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Remote store endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST API, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// TCP connect timeout in seconds (also used by the connectivity probe).
    pub connect_timeout_secs: u64,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic sync runs.
    pub poll_interval: u64,
    /// Attempts per record per push pass before it is deferred.
    pub push_max_attempts: u32,
    /// Base delay of the per-request retry backoff (milliseconds).
    pub retry_base_delay_ms: u64,
    /// Ceiling of the per-request retry backoff (milliseconds).
    pub retry_max_delay_ms: u64,
    /// Base delay after a failed run (seconds).
    pub run_backoff_base_secs: u64,
    /// Ceiling of the delay after repeated failed runs (seconds).
    pub run_backoff_max_secs: u64,
    /// Days a synced tombstone is kept before it is purged.
    pub tombstone_retention_days: u32,
}

/// Conflict recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    /// Days superseded edits are kept; `0` keeps them forever.
    pub superseded_retention_days: u32,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the local replica.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

/// Account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Account email. `None` until the user runs `redstone auth login`.
    pub user: Option<String>,
    /// Bearer token override; when set the keyring is not consulted.
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/redstone/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("redstone")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            push_max_attempts: 4,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            run_backoff_base_secs: 5,
            run_backoff_max_secs: 300,
            tombstone_retention_days: 30,
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            superseded_retention_days: 90,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("redstone");
        Self {
            database: data_dir.join("redstone.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Duration accessors
// ---------------------------------------------------------------------------

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn run_backoff_base(&self) -> Duration {
        Duration::from_secs(self.run_backoff_base_secs)
    }

    pub fn run_backoff_max(&self) -> Duration {
        Duration::from_secs(self.run_backoff_max_secs)
    }

    pub fn tombstone_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.tombstone_retention_days))
    }
}

impl ConflictsConfig {
    /// Retention window, or `None` when superseded edits are kept forever.
    pub fn superseded_retention(&self) -> Option<chrono::Duration> {
        match self.superseded_retention_days {
            0 => None,
            days => Some(chrono::Duration::days(i64::from(days))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- remote ---
        positive("remote.request_timeout_secs", self.remote.request_timeout_secs);
        positive("remote.connect_timeout_secs", self.remote.connect_timeout_secs);

        // --- sync ---
        positive("sync.poll_interval", self.sync.poll_interval);
        positive("sync.push_max_attempts", u64::from(self.sync.push_max_attempts));
        positive("sync.retry_base_delay_ms", self.sync.retry_base_delay_ms);
        positive("sync.run_backoff_base_secs", self.sync.run_backoff_base_secs);

        match url::Url::parse(&self.remote.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            Ok(_) => errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL with a host: {}", self.remote.base_url),
            }),
            Err(e) => errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("invalid URL '{}': {e}", self.remote.base_url),
            }),
        }

        if self.sync.retry_max_delay_ms < self.sync.retry_base_delay_ms {
            errors.push(ValidationError {
                field: "sync.retry_max_delay_ms".into(),
                message: format!(
                    "retry_max_delay_ms ({}) must not be below retry_base_delay_ms ({})",
                    self.sync.retry_max_delay_ms, self.sync.retry_base_delay_ms
                ),
            });
        }
        if self.sync.run_backoff_max_secs < self.sync.run_backoff_base_secs {
            errors.push(ValidationError {
                field: "sync.run_backoff_max_secs".into(),
                message: format!(
                    "run_backoff_max_secs ({}) must not be below run_backoff_base_secs ({})",
                    self.sync.run_backoff_max_secs, self.sync.run_backoff_base_secs
                ),
            });
        }

        // --- storage ---
        if self.storage.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        // --- auth ---
        if let Some(user) = &self.auth.user {
            if !user.contains('@') {
                errors.push(ValidationError {
                    field: "auth.user".into(),
                    message: format!("expected an email address, got '{user}'"),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use redstone_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .remote_base_url("https://notes.example.com/api")
///     .sync_poll_interval(120)
///     .storage_database(PathBuf::from("/tmp/redstone.db"))
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.request_timeout_secs = seconds;
        self
    }

    pub fn remote_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.connect_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn sync_push_max_attempts(mut self, attempts: u32) -> Self {
        self.config.sync.push_max_attempts = attempts;
        self
    }

    pub fn sync_retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.sync.retry_base_delay_ms = base;
        self.config.sync.retry_max_delay_ms = max;
        self
    }

    pub fn sync_run_backoff_secs(mut self, base: u64, max: u64) -> Self {
        self.config.sync.run_backoff_base_secs = base;
        self.config.sync.run_backoff_max_secs = max;
        self
    }

    pub fn sync_tombstone_retention_days(mut self, days: u32) -> Self {
        self.config.sync.tombstone_retention_days = days;
        self
    }

    // --- conflicts ---

    pub fn conflicts_superseded_retention_days(mut self, days: u32) -> Self {
        self.config.conflicts.superseded_retention_days = days;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- auth ---

    pub fn auth_user(mut self, user: impl Into<String>) -> Self {
        self.config.auth.user = Some(user.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth.token = Some(token.into());
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
