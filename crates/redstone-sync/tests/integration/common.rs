//! Shared test helpers for sync integration tests
//!
//! [`FakeRemote`] is an in-memory remote store with the semantics of the
//! real server. Creates are idempotent on the client id, and a replay with
//! other content is a conflict. Updates check the revision. Deletions are
//! soft and show up in the change feed, which is ordered by a logical
//! server clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use redstone_cache::{DatabasePool, SqliteLocalStore};
use redstone_core::config::{Config, ConfigBuilder};
use redstone_core::domain::{
    Payload, Record, RecordId, RecordKind, RemoteRevision, SyncCursor,
};
use redstone_core::ports::{
    AlwaysOnline, ChangeSet, Changes, IConnectivity, ILocalStore, IRemoteStore, RemoteError,
    RemoteRecord, RemoteResult,
};
use redstone_sync::{RunOutcome, SyncOrchestrator, SyncReport};

pub const USER: &str = "user@example.com";

/// 2026-01-01T00:00:00Z plus `secs`
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
}

pub fn id(raw: &str) -> RecordId {
    RecordId::new(raw).unwrap()
}

/// Config with millisecond retry delays and no run backoff
pub fn fast_config() -> Config {
    ConfigBuilder::new()
        .sync_push_max_attempts(3)
        .sync_retry_delays_ms(1, 5)
        .sync_run_backoff_secs(0, 0)
        .build()
}

/// A fresh in-memory replica for `USER`
pub async fn open_store() -> Arc<dyn ILocalStore> {
    let db = DatabasePool::in_memory().await.unwrap();
    Arc::new(SqliteLocalStore::open(db.pool().clone(), USER).await.unwrap())
}

/// An always-online orchestrator over `store` and `remote`
pub fn orchestrator(
    store: &Arc<dyn ILocalStore>,
    remote: &Arc<FakeRemote>,
    config: &Config,
) -> SyncOrchestrator {
    let remote: Arc<dyn IRemoteStore> = remote.clone();
    SyncOrchestrator::new(Arc::clone(store), remote, Arc::new(AlwaysOnline), config)
}

/// Runs once and expects a completed run
pub async fn sync(orchestrator: &SyncOrchestrator) -> SyncReport {
    match orchestrator.run(&CancellationToken::new()).await {
        Ok(RunOutcome::Completed(report)) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

/// Edits a synced file as a local change made at `secs`
pub async fn edit_at(store: &Arc<dyn ILocalStore>, raw_id: &str, title: &str, secs: i64) {
    let mut record = store.get(&id(raw_id)).await.unwrap().unwrap();
    record
        .set_payload(Payload::file(title, format!("{title} body")), at(secs))
        .unwrap();
    assert!(store.upsert(&record).await.unwrap());
}

pub fn file(title: &str) -> Payload {
    Payload::file(title, format!("{title} body"))
}

// ============================================================================
// Connectivity
// ============================================================================

/// Connectivity gate the test can flip
#[derive(Debug)]
pub struct FakeConnectivity {
    online: AtomicBool,
}

impl FakeConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IConnectivity for FakeConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Remote store
// ============================================================================

struct Stored {
    record: RemoteRecord,
    changed_at: DateTime<Utc>,
}

#[derive(Default)]
struct ServerState {
    records: HashMap<RecordId, Stored>,
    clock: i64,
    revisions: u64,
}

impl ServerState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        at(self.clock)
    }

    fn next_revision(&mut self) -> RemoteRevision {
        self.revisions += 1;
        RemoteRevision::new(format!("rev-{}", self.revisions)).unwrap()
    }

    fn store(&mut self, mut record: RemoteRecord) -> RemoteRecord {
        record.revision = self.next_revision();
        let changed_at = self.tick();
        self.records.insert(
            record.id.clone(),
            Stored {
                record: record.clone(),
                changed_at,
            },
        );
        record
    }

    fn live(&self, id: &RecordId) -> Option<&RemoteRecord> {
        self.records
            .get(id)
            .map(|stored| &stored.record)
            .filter(|record| record.deleted_at.is_none())
    }
}

/// In-memory remote store
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<ServerState>,
    failures: Mutex<VecDeque<RemoteError>>,
    fail_always: Mutex<Option<RemoteError>>,
    lose_next_response: AtomicBool,
    gate_changes: AtomicBool,
    changes_gate: Notify,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub changes_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next calls fail with these errors, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// Every call fails with `error` until cleared with `None`
    pub fn fail_always(&self, error: Option<RemoteError>) {
        *self.fail_always.lock().unwrap() = error;
    }

    /// The next mutation is applied but its response is lost
    pub fn lose_next_response(&self) {
        self.lose_next_response.store(true, Ordering::SeqCst);
    }

    /// `changes_since` waits for [`FakeRemote::release_changes`]
    pub fn gate_changes(&self) {
        self.gate_changes.store(true, Ordering::SeqCst);
    }

    pub fn release_changes(&self) {
        self.gate_changes.store(false, Ordering::SeqCst);
        self.changes_gate.notify_one();
    }

    /// Live server copy of a record
    pub fn get(&self, record_id: &RecordId) -> Option<RemoteRecord> {
        self.state.lock().unwrap().live(record_id).cloned()
    }

    /// Number of live records on the server
    pub fn live_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .records
            .values()
            .filter(|stored| stored.record.deleted_at.is_none())
            .count()
    }

    pub fn is_deleted(&self, record_id: &RecordId) -> bool {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(record_id)
            .is_some_and(|stored| stored.record.deleted_at.is_some())
    }

    /// Writes a version as another device would
    pub fn write_from_other_device(
        &self,
        record_id: &str,
        payload: Payload,
        updated_at: DateTime<Utc>,
    ) -> RemoteRecord {
        let mut state = self.state.lock().unwrap();
        let created_at = state
            .records
            .get(&id(record_id))
            .map_or(updated_at, |stored| stored.record.created_at);
        let parent_ref = state
            .records
            .get(&id(record_id))
            .and_then(|stored| stored.record.parent_ref.clone());
        state.store(RemoteRecord {
            id: id(record_id),
            parent_ref,
            payload,
            created_at,
            updated_at,
            deleted_at: None,
            revision: RemoteRevision::new("pending").unwrap(),
        })
    }

    /// Deletes a record as another device would
    pub fn delete_from_other_device(&self, record_id: &str) {
        let mut state = self.state.lock().unwrap();
        let changed_at = state.tick();
        if let Some(stored) = state.records.get_mut(&id(record_id)) {
            stored.record.deleted_at = Some(changed_at);
            stored.changed_at = changed_at;
        }
    }

    fn injected_failure(&self) -> RemoteResult<()> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(())
    }

    fn respond<T>(&self, value: T) -> RemoteResult<T> {
        if self.lose_next_response.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Network("connection reset".to_string()));
        }
        Ok(value)
    }
}

fn to_remote(record: &Record) -> RemoteRecord {
    RemoteRecord {
        id: record.id().clone(),
        parent_ref: record.parent_ref().cloned(),
        payload: record.payload().clone(),
        created_at: record.created_at(),
        updated_at: record.updated_at(),
        deleted_at: None,
        revision: RemoteRevision::new("pending").unwrap(),
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FakeRemote {
    async fn create(&self, record: &Record) -> RemoteResult<RemoteRecord> {
        self.injected_failure()?;
        let created = {
            let mut state = self.state.lock().unwrap();
            match state.records.get(record.id()) {
                Some(existing) if existing.record.deleted_at.is_some() => {
                    return Err(RemoteError::Rejected {
                        status: 410,
                        message: "record was deleted".to_string(),
                    });
                }
                // Replayed create: the id is the idempotency key
                Some(existing) if existing.record.same_content(record) => existing.record.clone(),
                Some(existing) => {
                    return Err(RemoteError::Conflict(format!(
                        "record exists at revision {}",
                        existing.record.revision
                    )));
                }
                None => {
                    self.creates.fetch_add(1, Ordering::SeqCst);
                    state.store(to_remote(record))
                }
            }
        };
        self.respond(created)
    }

    async fn update(
        &self,
        record: &Record,
        if_match: &RemoteRevision,
    ) -> RemoteResult<RemoteRecord> {
        self.injected_failure()?;
        let updated = {
            let mut state = self.state.lock().unwrap();
            let Some(current) = state.live(record.id()) else {
                return Err(RemoteError::NotFound(record.id().to_string()));
            };
            if &current.revision != if_match {
                return Err(RemoteError::Conflict(format!(
                    "expected {if_match}, server has {}",
                    current.revision
                )));
            }
            let created_at = current.created_at;
            let mut next = to_remote(record);
            next.created_at = created_at;
            self.updates.fetch_add(1, Ordering::SeqCst);
            state.store(next)
        };
        self.respond(updated)
    }

    async fn delete(&self, _kind: RecordKind, record_id: &RecordId) -> RemoteResult<()> {
        self.injected_failure()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if state.live(record_id).is_none() {
                return Err(RemoteError::NotFound(record_id.to_string()));
            }
            let changed_at = state.tick();
            if let Some(stored) = state.records.get_mut(record_id) {
                stored.record.deleted_at = Some(changed_at);
                stored.changed_at = changed_at;
            }
        }
        self.respond(())
    }

    async fn fetch(&self, _kind: RecordKind, record_id: &RecordId) -> RemoteResult<RemoteRecord> {
        self.injected_failure()?;
        self.state
            .lock()
            .unwrap()
            .live(record_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(record_id.to_string()))
    }

    async fn changes_since(&self, cursor: &SyncCursor) -> RemoteResult<ChangeSet> {
        self.changes_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_changes.load(Ordering::SeqCst) {
            self.changes_gate.notified().await;
        }
        self.injected_failure()?;

        let since = cursor.instant().unwrap_or(at(0));
        let state = self.state.lock().unwrap();
        let mut changes = ChangeSet::empty(SyncCursor::new(at(state.clock).to_rfc3339()).unwrap());

        let mut changed: Vec<&Stored> = state
            .records
            .values()
            .filter(|stored| stored.changed_at > since)
            .collect();
        changed.sort_by_key(|stored| stored.changed_at);

        for stored in changed {
            let section: &mut Changes = match stored.record.kind() {
                RecordKind::File => &mut changes.files,
                RecordKind::Folder => &mut changes.folders,
            };
            if stored.record.deleted_at.is_some() {
                section.deleted.push(stored.record.id.clone());
            } else {
                section.upserted.push(stored.record.clone());
            }
        }
        Ok(changes)
    }
}
