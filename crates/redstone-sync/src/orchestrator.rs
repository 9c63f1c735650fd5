//! Sync orchestrator
//!
//! One sync run is: connectivity check, push pass, pull pass (which
//! advances the cursor), then cleanup of expired tombstones and superseded
//! edits.
//!
//! ## State machine
//!
//! ```text
//! Idle ──run──→ Running ──ok/auth/cancel──→ Idle
//!                  │
//!                  └──other failure──→ Backoff{until, failures} ──until passed──→ Running
//! ```
//!
//! Only one run executes at a time. A run requested while another is in
//! flight returns [`RunOutcome::Coalesced`] at once; the in-flight run
//! already reflects the latest local state or the next one will. Being
//! offline is not a failure: the run is skipped and the state is left
//! untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use redstone_core::config::Config;
use redstone_core::domain::SyncCursor;
use redstone_core::ports::{IConnectivity, ILocalStore, IRemoteStore};

use crate::backoff::Backoff;
use crate::pull::{PullEngine, PullSummary};
use crate::push::{PushEngine, PushSummary};
use crate::retry::RetryPolicy;
use crate::SyncError;

// ============================================================================
// State and outcomes
// ============================================================================

/// Orchestrator state, observable through [`SyncOrchestrator::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Running,
    /// Runs are refused until `until` after `failures` consecutive failures
    Backoff { until: DateTime<Utc>, failures: u32 },
}

/// Result of a call to [`SyncOrchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// Another run was already in flight
    Coalesced,
    /// The remote store is unreachable; nothing was attempted
    Offline,
    /// A previous failure put the orchestrator in backoff
    BackingOff { retry_in: Duration },
    /// The cancellation token fired; the cursor was not advanced
    Cancelled,
}

/// Summary of a completed sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub deleted_remotely: usize,
    pub pulled: usize,
    pub tombstones_applied: usize,
    pub conflicts: usize,
    pub resurrected: usize,
    /// Records still dirty after exhausting their retries
    pub deferred: usize,
    pub purged_tombstones: u64,
    pub purged_superseded: u64,
    pub cursor: SyncCursor,
    pub duration_ms: u64,
}

impl SyncReport {
    fn from_passes(push: PushSummary, pull: PullSummary) -> Self {
        Self {
            pushed: push.pushed,
            deleted_remotely: push.deleted,
            pulled: pull.pulled,
            tombstones_applied: pull.tombstones_applied,
            conflicts: push.conflicts + pull.conflicts,
            resurrected: push.resurrected + pull.resurrected,
            deferred: push.deferred,
            purged_tombstones: 0,
            purged_superseded: 0,
            cursor: pull.cursor,
            duration_ms: 0,
        }
    }

    /// True when some local changes could not be delivered this run
    pub fn is_degraded(&self) -> bool {
        self.deferred > 0
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Runs push and pull passes under a single-flight lock
pub struct SyncOrchestrator {
    store: Arc<dyn ILocalStore>,
    connectivity: Arc<dyn IConnectivity>,
    push: PushEngine,
    pull: PullEngine,
    run_backoff: Backoff,
    tombstone_retention: chrono::Duration,
    superseded_retention: Option<chrono::Duration>,
    running: AtomicBool,
    state: watch::Sender<SyncState>,
}

/// Releases the single-flight lock, also when a run future is dropped
struct RunGuard<'a> {
    running: &'a AtomicBool,
    state: &'a watch::Sender<SyncState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == SyncState::Running {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });
        self.running.store(false, Ordering::Release);
    }
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn ILocalStore>,
        remote: Arc<dyn IRemoteStore>,
        connectivity: Arc<dyn IConnectivity>,
        config: &Config,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.sync);
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            push: PushEngine::new(Arc::clone(&store), Arc::clone(&remote), policy),
            pull: PullEngine::new(Arc::clone(&store), remote, policy),
            store,
            connectivity,
            run_backoff: Backoff::new(
                config.sync.run_backoff_base(),
                config.sync.run_backoff_max(),
                true,
            ),
            tombstone_retention: config.sync.tombstone_retention(),
            superseded_retention: config.conflicts.superseded_retention(),
            running: AtomicBool::new(false),
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Time left before a run is allowed again, if in backoff
    pub fn backoff_remaining(&self) -> Option<Duration> {
        match self.state() {
            SyncState::Backoff { until, .. } => {
                Some((until - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            }
            _ => None,
        }
    }

    /// Executes one sync run
    ///
    /// # Errors
    ///
    /// [`SyncError::Auth`] leaves the orchestrator idle: retrying cannot
    /// help until the user logs in again. Any other error moves it to
    /// [`SyncState::Backoff`].
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync run already in flight, coalescing");
            return Ok(RunOutcome::Coalesced);
        }
        let _guard = RunGuard {
            running: &self.running,
            state: &self.state,
        };

        let previous_failures = match self.state() {
            SyncState::Backoff { until, failures } => {
                let now = Utc::now();
                if now < until {
                    let retry_in = (until - now).to_std().unwrap_or(Duration::ZERO);
                    debug!(retry_in_ms = retry_in.as_millis() as u64, "Sync in backoff");
                    return Ok(RunOutcome::BackingOff { retry_in });
                }
                failures
            }
            _ => 0,
        };

        if !self.connectivity.is_online().await {
            info!("Remote store unreachable, skipping sync run");
            return Ok(RunOutcome::Offline);
        }

        self.state.send_replace(SyncState::Running);
        info!("Sync run started");
        let started = Instant::now();

        match self.run_passes(cancel).await {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                self.state.send_replace(SyncState::Idle);
                info!(
                    pushed = report.pushed,
                    pulled = report.pulled,
                    conflicts = report.conflicts,
                    deferred = report.deferred,
                    duration_ms = report.duration_ms,
                    "Sync run completed"
                );
                Ok(RunOutcome::Completed(report))
            }
            Err(SyncError::Cancelled) => {
                self.state.send_replace(SyncState::Idle);
                info!("Sync run cancelled");
                Ok(RunOutcome::Cancelled)
            }
            Err(err) if err.is_auth() => {
                self.state.send_replace(SyncState::Idle);
                error!(error = %err, "Sync run stopped, re-authentication required");
                Err(err)
            }
            Err(err) => {
                let failures = previous_failures.saturating_add(1);
                let delay = self.run_backoff.delay(failures - 1);
                let until = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                self.state
                    .send_replace(SyncState::Backoff { until, failures });
                warn!(
                    error = %err,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    "Sync run failed, backing off"
                );
                Err(err)
            }
        }
    }

    async fn run_passes(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let push = self.push.push(cancel).await?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let pull = self.pull.pull(cancel).await?;

        let mut report = SyncReport::from_passes(push, pull);
        self.collect_garbage(&mut report).await;
        Ok(report)
    }

    /// Purges expired tombstones and superseded edits
    ///
    /// Failures are logged and do not fail the run.
    async fn collect_garbage(&self, report: &mut SyncReport) {
        let now = Utc::now();

        match self
            .store
            .purge_tombstones(now - self.tombstone_retention)
            .await
        {
            Ok(purged) => report.purged_tombstones = purged,
            Err(err) => warn!(error = %err, "Failed to purge expired tombstones"),
        }

        if let Some(retention) = self.superseded_retention {
            match self.store.purge_superseded(now - retention).await {
                Ok(purged) => report.purged_superseded = purged,
                Err(err) => warn!(error = %err, "Failed to purge superseded edits"),
            }
        }

        if report.purged_tombstones > 0 || report.purged_superseded > 0 {
            debug!(
                tombstones = report.purged_tombstones,
                superseded = report.purged_superseded,
                "Purged expired local state"
            );
        }
    }
}
