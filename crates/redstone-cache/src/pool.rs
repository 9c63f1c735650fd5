//! Opening and migrating the replica database
//!
//! The schema version lives in SQLite's `user_version` pragma. A file at an
//! older version is upgraded in place; a file from a newer release is
//! refused rather than written with an outdated layout.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Version stamped into `user_version` by [`DatabasePool::new`]
pub const SCHEMA_VERSION: i64 = 1;

/// Ordered schema steps; step `n` upgrades version `n` to `n + 1`
const MIGRATIONS: &[&str] = &[include_str!("migrations/20261016_initial.sql")];

/// Connection pool over the replica database
///
/// File databases run in WAL mode with a busy timeout, so the CLI and the
/// daemon can write to the same file.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the database at `db_path`, creating the file and its directory
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!("{}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("{}: {e}", db_path.display())))?;

        migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), "Replica database opened");
        Ok(Self { pool })
    }

    /// Private in-memory database, used by tests
    ///
    /// An in-memory database lives in a single connection, so the pool
    /// is capped at one.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn schema_version(pool: &SqlitePool) -> Result<i64, CacheError> {
    Ok(sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?)
}

/// Brings the schema up to [`SCHEMA_VERSION`]
async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
    let found = schema_version(pool).await?;
    if found > SCHEMA_VERSION {
        return Err(CacheError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for (index, step) in MIGRATIONS.iter().enumerate().skip(found.max(0) as usize) {
        let target = index as i64 + 1;
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(step)
            .execute(&mut *tx)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("step {target}: {e}")))?;
        // PRAGMA does not accept bound parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {target}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::debug!(version = target, "Applied schema migration");
    }
    Ok(())
}
