//! Redstone Cache - the durable local replica
//!
//! One SQLite file holds, per account:
//! - records (files and folders) with their dirty flag and last
//!   acknowledged server revision
//! - superseded edits kept for conflict recovery
//! - retired ids, which are never materialized again
//! - the sync cursor of each (user, device) pair
//!
//! plus the device identity shared by every account on this machine.
//!
//! [`SqliteLocalStore`] implements the `ILocalStore` port of
//! `redstone-core`; [`DatabasePool`] opens and migrates the file.
//!
//! ```no_run
//! use std::path::Path;
//! use redstone_cache::{DatabasePool, SqliteLocalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = DatabasePool::new(Path::new("/home/user/.local/share/redstone/redstone.db")).await?;
//! let store = SqliteLocalStore::open(db.pool().clone(), "user@example.com").await?;
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::{DatabasePool, SCHEMA_VERSION};
pub use repository::{load_or_create_device_id, SqliteLocalStore};

/// Errors raised by the SQLite replica
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cannot open database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The file was written by a newer release
    #[error("Database schema v{found} is newer than the supported v{supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    /// A stored value no longer maps onto a domain type
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
