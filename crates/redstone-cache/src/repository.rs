//! SQLite implementation of ILocalStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! local store port defined in redstone-core. It handles all domain type
//! conversion and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                        |
//! |--------------------|----------|-------------------------------------------------|
//! | RecordId           | TEXT     | String via `.as_str()` / `RecordId::new()`      |
//! | DeviceId           | TEXT     | UUID string via `.to_string()` / `FromStr`      |
//! | SupersededId       | TEXT     | UUID string via `.to_string()` / `FromStr`      |
//! | RemoteRevision     | TEXT     | String via `.as_str()` / `RemoteRevision::new()`|
//! | SyncCursor         | TEXT     | String via `.as_str()` / `SyncCursor::new()`    |
//! | DateTime<Utc>      | INTEGER  | Epoch milliseconds                              |
//! | Payload            | TEXT x2  | `label` (title or name) + `content` (files)     |
//! | RecordKind         | TEXT     | `file` / `folder`                               |
//! | SupersedeReason    | TEXT     | `.as_str()` / `FromStr`                         |
//! | bool               | INTEGER  | 0 / 1                                           |
//!
//! ## Write rules
//!
//! Every statement is scoped to the store's user. The newer-wins rule of
//! `upsert` is evaluated inside a single `INSERT .. ON CONFLICT DO UPDATE
//! .. WHERE` statement so that no other writer can slip in between the
//! check and the write.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use redstone_core::domain::{
    newtypes::{DeviceId, RecordId, RemoteRevision, ReplicaKey, SupersededId, SyncCursor},
    now_millis, Payload, Record, RecordKind, RecordParts, SupersedeReason, SupersededEdit,
};
use redstone_core::ports::{
    ILocalStore, MergeBatch, RecordFilter, RemoteRecord, StoreStats, TombstoneOrigin,
};

use crate::CacheError;

/// Attempts at a compare-and-swap cursor update
const CURSOR_CAS_ATTEMPTS: usize = 3;

/// Conditional upsert; `?12` forces the replace past the newer-wins rule
///
/// Retired ids are never inserted and a tombstone is never overwritten by
/// a live row, forced or not.
const UPSERT_SQL: &str = "\
    INSERT INTO records \
        (user_id, id, kind, parent_ref, label, content, \
         created_at_ms, updated_at_ms, deleted_at_ms, dirty, remote_revision) \
    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11 \
    WHERE NOT EXISTS (SELECT 1 FROM retired_ids WHERE user_id = ?1 AND id = ?2) \
    ON CONFLICT (user_id, id) DO UPDATE SET \
        kind = excluded.kind, \
        parent_ref = excluded.parent_ref, \
        label = excluded.label, \
        content = excluded.content, \
        created_at_ms = excluded.created_at_ms, \
        updated_at_ms = excluded.updated_at_ms, \
        deleted_at_ms = excluded.deleted_at_ms, \
        dirty = excluded.dirty, \
        remote_revision = excluded.remote_revision \
    WHERE (records.deleted_at_ms IS NULL OR excluded.deleted_at_ms IS NOT NULL) \
      AND (?12 = 1 \
           OR records.updated_at_ms < excluded.updated_at_ms \
           OR (records.updated_at_ms = excluded.updated_at_ms \
               AND (records.dirty = 0 OR excluded.dirty = 1)))";

const REMOTE_TOMBSTONE_SQL: &str = "\
    UPDATE records SET \
        deleted_at_ms = COALESCE(deleted_at_ms, ?1), \
        updated_at_ms = MAX(updated_at_ms, ?1), \
        dirty = 0 \
    WHERE user_id = ?2 AND id = ?3";

/// SQLite-based implementation of the local store port
///
/// Bound to one [`ReplicaKey`]; several users may share a database file.
pub struct SqliteLocalStore {
    pool: SqlitePool,
    replica: ReplicaKey,
}

impl SqliteLocalStore {
    /// Creates a store for an explicit replica key
    pub fn new(pool: SqlitePool, replica: ReplicaKey) -> Self {
        Self { pool, replica }
    }

    /// Creates a store for `user_id` on this database's device
    ///
    /// The device id is generated on first use and persisted.
    pub async fn open(pool: SqlitePool, user_id: &str) -> anyhow::Result<Self> {
        let device_id = load_or_create_device_id(&pool).await?;
        let replica = ReplicaKey::new(user_id, device_id)?;
        tracing::debug!(replica = %replica, "Local store opened");
        Ok(Self::new(pool, replica))
    }

    /// Returns the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn user(&self) -> &str {
        &self.replica.user_id
    }
}

/// Returns the device id stored in the database, generating it once
pub async fn load_or_create_device_id(pool: &SqlitePool) -> Result<DeviceId, CacheError> {
    sqlx::query(
        "INSERT OR IGNORE INTO device_identity (singleton, device_id, created_at_ms) \
         VALUES (1, ?, ?)",
    )
    .bind(DeviceId::new().to_string())
    .bind(now_millis().timestamp_millis())
    .execute(pool)
    .await?;

    let stored: String =
        sqlx::query_scalar("SELECT device_id FROM device_identity WHERE singleton = 1")
            .fetch_one(pool)
            .await?;
    DeviceId::from_str(&stored).map_err(|e| CacheError::InvalidRow(e.to_string()))
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CacheError::InvalidRow(format!("Timestamp out of range: {ms}")))
}

fn payload_columns(payload: &Payload) -> (&str, Option<&str>) {
    match payload {
        Payload::File { title, content } => (title, Some(content)),
        Payload::Folder { name } => (name, None),
    }
}

fn payload_from_columns(
    kind: &str,
    label: String,
    content: Option<String>,
) -> Result<Payload, CacheError> {
    let kind =
        RecordKind::from_str(kind).map_err(|e| CacheError::InvalidRow(e.to_string()))?;
    Ok(match kind {
        RecordKind::File => Payload::File {
            title: label,
            content: content.unwrap_or_default(),
        },
        RecordKind::Folder => Payload::Folder { name: label },
    })
}

fn record_id(s: String) -> Result<RecordId, CacheError> {
    RecordId::new(s).map_err(|e| CacheError::InvalidRow(e.to_string()))
}

fn optional_record_id(s: Option<String>) -> Result<Option<RecordId>, CacheError> {
    s.map(record_id).transpose()
}

/// Escapes LIKE wildcards so user search text matches literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn record_from_row(row: &SqliteRow) -> Result<Record, CacheError> {
    let kind: String = row.get("kind");
    let payload = payload_from_columns(&kind, row.get("label"), row.get("content"))?;
    let deleted_at: Option<i64> = row.get("deleted_at_ms");
    let dirty: i64 = row.get("dirty");
    let revision: Option<String> = row.get("remote_revision");

    Ok(Record::from_parts(RecordParts {
        id: record_id(row.get("id"))?,
        parent_ref: optional_record_id(row.get("parent_ref"))?,
        payload,
        created_at: from_millis(row.get("created_at_ms"))?,
        updated_at: from_millis(row.get("updated_at_ms"))?,
        deleted_at: deleted_at.map(from_millis).transpose()?,
        dirty: dirty != 0,
        remote_revision: revision
            .map(RemoteRevision::new)
            .transpose()
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?,
    }))
}

fn superseded_from_row(row: &SqliteRow) -> Result<SupersededEdit, CacheError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let reason: String = row.get("reason");

    Ok(SupersededEdit {
        id: SupersededId::from_str(&id)
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?,
        record_id: record_id(row.get("record_id"))?,
        parent_ref: optional_record_id(row.get("parent_ref"))?,
        payload: payload_from_columns(&kind, row.get("label"), row.get("content"))?,
        loser_updated_at: from_millis(row.get("loser_updated_at_ms"))?,
        winner_updated_at: from_millis(row.get("winner_updated_at_ms"))?,
        reason: SupersedeReason::from_str(&reason)
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?,
        replacement_id: optional_record_id(row.get("replacement_id"))?,
        recorded_at: from_millis(row.get("recorded_at_ms"))?,
    })
}

// ============================================================================
// Statement helpers shared by single writes and merge transactions
// ============================================================================

async fn upsert_record<'e, E>(
    executor: E,
    user: &str,
    record: &Record,
    force: bool,
) -> Result<bool, CacheError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (label, content) = payload_columns(record.payload());
    let result = sqlx::query(UPSERT_SQL)
        .bind(user)
        .bind(record.id().as_str())
        .bind(record.kind().as_str())
        .bind(record.parent_ref().map(RecordId::as_str))
        .bind(label)
        .bind(content)
        .bind(to_millis(record.created_at()))
        .bind(to_millis(record.updated_at()))
        .bind(record.deleted_at().map(to_millis))
        .bind(i64::from(record.is_dirty()))
        .bind(record.remote_revision().map(RemoteRevision::as_str))
        .bind(i64::from(force))
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

async fn insert_superseded<'e, E>(
    executor: E,
    user: &str,
    edit: &SupersededEdit,
) -> Result<bool, CacheError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (label, content) = payload_columns(&edit.payload);
    let result = sqlx::query(
        "INSERT OR IGNORE INTO superseded_edits \
         (id, user_id, record_id, kind, parent_ref, label, content, \
          loser_updated_at_ms, winner_updated_at_ms, reason, replacement_id, recorded_at_ms) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(edit.id.to_string())
    .bind(user)
    .bind(edit.record_id.as_str())
    .bind(edit.kind().as_str())
    .bind(edit.parent_ref.as_ref().map(RecordId::as_str))
    .bind(label)
    .bind(content)
    .bind(to_millis(edit.loser_updated_at))
    .bind(to_millis(edit.winner_updated_at))
    .bind(edit.reason.as_str())
    .bind(edit.replacement_id.as_ref().map(RecordId::as_str))
    .bind(to_millis(edit.recorded_at))
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    fn replica(&self) -> &ReplicaKey {
        &self.replica
    }

    // --- Record operations ---

    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE user_id = ? AND id = ?")
            .bind(self.user())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        let mut sql = String::from("SELECT * FROM records WHERE user_id = ?");
        let mut binds: Vec<String> = vec![self.user().to_string()];

        if !filter.include_tombstoned {
            sql.push_str(" AND deleted_at_ms IS NULL");
        }

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            binds.push(kind.as_str().to_string());
        }

        match &filter.parent {
            Some(Some(parent)) => {
                sql.push_str(" AND parent_ref = ?");
                binds.push(parent.as_str().to_string());
            }
            Some(None) => sql.push_str(" AND parent_ref IS NULL"),
            None => {}
        }

        if let Some(dirty) = filter.dirty {
            sql.push_str(if dirty { " AND dirty = 1" } else { " AND dirty = 0" });
        }

        if let Some(ref text) = filter.text {
            sql.push_str(
                " AND (label LIKE ? ESCAPE '\\' OR COALESCE(content, '') LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(text);
            binds.push(pattern.clone());
            binds.push(pattern);
        }

        // Folders first, then by name
        sql.push_str(" ORDER BY kind DESC, label COLLATE NOCASE, id");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn upsert(&self, record: &Record) -> anyhow::Result<bool> {
        let applied = upsert_record(&self.pool, self.user(), record, false).await?;
        if applied {
            tracing::trace!(record_id = %record.id(), dirty = record.is_dirty(), "Upserted record");
        } else {
            tracing::debug!(record_id = %record.id(), "Upsert rejected: stored version is newer, tombstoned or retired");
        }
        Ok(applied)
    }

    async fn mark_tombstone(
        &self,
        id: &RecordId,
        at: DateTime<Utc>,
        origin: TombstoneOrigin,
    ) -> anyhow::Result<bool> {
        let result = match origin {
            // Local delete: bump updated_at past the previous value and mark dirty
            TombstoneOrigin::Local => {
                sqlx::query(
                    "UPDATE records SET \
                         updated_at_ms = MAX(?1, updated_at_ms + 1), \
                         deleted_at_ms = MAX(?1, updated_at_ms + 1), \
                         dirty = 1 \
                     WHERE user_id = ?2 AND id = ?3 AND deleted_at_ms IS NULL",
                )
                .bind(to_millis(at))
                .bind(self.user())
                .bind(id.as_str())
                .execute(&self.pool)
                .await?
            }
            // Remote delete: never over an unsynced live edit
            TombstoneOrigin::Remote => {
                sqlx::query(
                    "UPDATE records SET \
                         deleted_at_ms = COALESCE(deleted_at_ms, ?1), \
                         updated_at_ms = MAX(updated_at_ms, ?1), \
                         dirty = 0 \
                     WHERE user_id = ?2 AND id = ?3 \
                       AND (dirty = 0 OR deleted_at_ms IS NOT NULL)",
                )
                .bind(to_millis(at))
                .bind(self.user())
                .bind(id.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        let applied = result.rows_affected() == 1;
        tracing::trace!(record_id = %id, ?origin, applied, "Tombstone");
        Ok(applied)
    }

    async fn list_dirty(&self) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT * FROM records WHERE user_id = ? AND dirty = 1 \
             ORDER BY updated_at_ms ASC, id ASC",
        )
        .bind(self.user())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn acknowledge(
        &self,
        id: &RecordId,
        observed_updated_at: DateTime<Utc>,
        server: Option<&RemoteRecord>,
    ) -> anyhow::Result<bool> {
        // The revision is stored even when a newer local edit keeps the row
        // dirty, so the next push carries the right precondition. The server
        // timestamp only replaces the local one on a cleared row.
        let dirty: Option<i64> = sqlx::query_scalar(
            "UPDATE records SET \
                 remote_revision = COALESCE(?1, remote_revision), \
                 updated_at_ms = CASE WHEN updated_at_ms = ?2 \
                     THEN COALESCE(?3, updated_at_ms) ELSE updated_at_ms END, \
                 dirty = CASE WHEN updated_at_ms = ?2 THEN 0 ELSE dirty END \
             WHERE user_id = ?4 AND id = ?5 \
             RETURNING dirty",
        )
        .bind(server.map(|server| server.revision.as_str()))
        .bind(to_millis(observed_updated_at))
        .bind(server.map(|server| to_millis(server.updated_at)))
        .bind(self.user())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let cleared = dirty == Some(0);
        if !cleared {
            tracing::debug!(record_id = %id, "Acknowledged record stays dirty after a concurrent edit");
        }
        Ok(cleared)
    }

    async fn apply_merge(&self, batch: &MergeBatch) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Guards are no-op writes so the transaction holds the write lock
        // before anything is read.
        for (id, expected) in &batch.guards {
            let held = sqlx::query(
                "UPDATE records SET updated_at_ms = updated_at_ms \
                 WHERE user_id = ? AND id = ? AND updated_at_ms = ?",
            )
            .bind(self.user())
            .bind(id.as_str())
            .bind(to_millis(*expected))
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;
            if !held {
                tracing::debug!(record_id = %id, "Merge guard failed, record changed concurrently");
                tx.rollback().await?;
                return Ok(false);
            }
        }

        for record in &batch.upserts {
            let guarded = batch.guards.iter().any(|(id, _)| id == record.id());
            if !upsert_record(&mut *tx, self.user(), record, guarded).await? {
                tracing::debug!(record_id = %record.id(), "Merge upsert rejected");
                tx.rollback().await?;
                return Ok(false);
            }
        }

        for (id, at) in &batch.remote_tombstones {
            sqlx::query(REMOTE_TOMBSTONE_SQL)
                .bind(to_millis(*at))
                .bind(self.user())
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        for edit in &batch.superseded {
            insert_superseded(&mut *tx, self.user(), edit).await?;
        }

        tx.commit().await?;
        tracing::trace!(
            upserts = batch.upserts.len(),
            tombstones = batch.remote_tombstones.len(),
            superseded = batch.superseded.len(),
            "Merge batch committed"
        );
        Ok(true)
    }

    // --- Retired ids ---

    async fn retire_id(&self, id: &RecordId) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO retired_ids (user_id, id, retired_at_ms) VALUES (?, ?, ?)")
            .bind(self.user())
            .bind(id.as_str())
            .bind(to_millis(now_millis()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_retired(&self, id: &RecordId) -> anyhow::Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM retired_ids WHERE user_id = ? AND id = ?")
                .bind(self.user())
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    // --- Superseded edits ---

    async fn save_superseded(&self, edit: &SupersededEdit) -> anyhow::Result<bool> {
        let inserted = insert_superseded(&self.pool, self.user(), edit).await?;
        tracing::trace!(record_id = %edit.record_id, reason = %edit.reason, inserted, "Saved superseded edit");
        Ok(inserted)
    }

    async fn get_superseded(&self, id: &SupersededId) -> anyhow::Result<Option<SupersededEdit>> {
        let row = sqlx::query("SELECT * FROM superseded_edits WHERE user_id = ? AND id = ?")
            .bind(self.user())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(superseded_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_superseded(
        &self,
        record_id: Option<&RecordId>,
    ) -> anyhow::Result<Vec<SupersededEdit>> {
        let rows = match record_id {
            Some(record_id) => {
                sqlx::query(
                    "SELECT * FROM superseded_edits WHERE user_id = ? AND record_id = ? \
                     ORDER BY recorded_at_ms DESC, id DESC",
                )
                .bind(self.user())
                .bind(record_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM superseded_edits WHERE user_id = ? \
                     ORDER BY recorded_at_ms DESC, id DESC",
                )
                .bind(self.user())
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut edits = Vec::with_capacity(rows.len());
        for row in &rows {
            edits.push(superseded_from_row(row)?);
        }
        Ok(edits)
    }

    async fn delete_superseded(&self, id: &SupersededId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM superseded_edits WHERE user_id = ? AND id = ?")
            .bind(self.user())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // --- Cursor ---

    async fn get_cursor(&self) -> anyhow::Result<Option<SyncCursor>> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT cursor FROM sync_cursors WHERE user_id = ? AND device_id = ?",
        )
        .bind(self.user())
        .bind(self.replica.device_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored
            .map(SyncCursor::new)
            .transpose()
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?)
    }

    async fn advance_cursor(&self, cursor: &SyncCursor) -> anyhow::Result<bool> {
        let device = self.replica.device_id.to_string();

        for _ in 0..CURSOR_CAS_ATTEMPTS {
            let swapped = match self.get_cursor().await? {
                Some(current) if !cursor.is_after(&current) => {
                    tracing::debug!(current = %current, proposed = %cursor, "Cursor not advanced");
                    return Ok(false);
                }
                Some(current) => sqlx::query(
                    "UPDATE sync_cursors SET cursor = ?, updated_at_ms = ? \
                     WHERE user_id = ? AND device_id = ? AND cursor = ?",
                )
                .bind(cursor.as_str())
                .bind(to_millis(now_millis()))
                .bind(self.user())
                .bind(&device)
                .bind(current.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected(),
                None => sqlx::query(
                    "INSERT INTO sync_cursors (user_id, device_id, cursor, updated_at_ms) \
                     VALUES (?, ?, ?, ?) ON CONFLICT (user_id, device_id) DO NOTHING",
                )
                .bind(self.user())
                .bind(&device)
                .bind(cursor.as_str())
                .bind(to_millis(now_millis()))
                .execute(&self.pool)
                .await?
                .rows_affected(),
            };

            if swapped == 1 {
                tracing::debug!(cursor = %cursor, "Cursor advanced");
                return Ok(true);
            }
        }
        anyhow::bail!("Cursor for {} kept changing concurrently", self.replica)
    }

    // --- Maintenance ---

    async fn purge_tombstones(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO retired_ids (user_id, id, retired_at_ms) \
             SELECT user_id, id, ? FROM records \
             WHERE user_id = ? AND deleted_at_ms IS NOT NULL AND dirty = 0 AND deleted_at_ms < ?",
        )
        .bind(to_millis(now_millis()))
        .bind(self.user())
        .bind(to_millis(older_than))
        .execute(&mut *tx)
        .await?;

        let purged = sqlx::query(
            "DELETE FROM records \
             WHERE user_id = ? AND deleted_at_ms IS NOT NULL AND dirty = 0 AND deleted_at_ms < ?",
        )
        .bind(self.user())
        .bind(to_millis(older_than))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        if purged > 0 {
            tracing::info!(purged, "Purged synced tombstones");
        }
        Ok(purged)
    }

    async fn purge_superseded(&self, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
        let purged = sqlx::query(
            "DELETE FROM superseded_edits WHERE user_id = ? AND recorded_at_ms < ?",
        )
        .bind(self.user())
        .bind(to_millis(older_than))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if purged > 0 {
            tracing::info!(purged, "Purged superseded edits");
        }
        Ok(purged)
    }

    async fn stats(&self) -> anyhow::Result<StoreStats> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) AS records, \
                 COALESCE(SUM(CASE WHEN kind = 'file' AND deleted_at_ms IS NULL THEN 1 ELSE 0 END), 0) AS files, \
                 COALESCE(SUM(CASE WHEN kind = 'folder' AND deleted_at_ms IS NULL THEN 1 ELSE 0 END), 0) AS folders, \
                 COALESCE(SUM(dirty), 0) AS dirty, \
                 COALESCE(SUM(CASE WHEN deleted_at_ms IS NOT NULL THEN 1 ELSE 0 END), 0) AS tombstones \
             FROM records WHERE user_id = ?",
        )
        .bind(self.user())
        .fetch_one(&self.pool)
        .await?;

        let superseded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM superseded_edits WHERE user_id = ?")
                .bind(self.user())
                .fetch_one(&self.pool)
                .await?;
        let retired: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM retired_ids WHERE user_id = ?")
            .bind(self.user())
            .fetch_one(&self.pool)
            .await?;

        let count = |name: &str| -> u64 { row.get::<i64, _>(name).max(0) as u64 };
        Ok(StoreStats {
            records: count("records"),
            files: count("files"),
            folders: count("folders"),
            dirty: count("dirty"),
            tombstones: count("tombstones"),
            superseded: superseded.max(0) as u64,
            retired: retired.max(0) as u64,
        })
    }
}
