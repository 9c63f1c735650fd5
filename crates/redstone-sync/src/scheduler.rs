//! Sync scheduler - turns a poll interval and on-demand triggers into runs
//!
//! ## Flow
//!
//! ```text
//! interval tick ──┐
//! SyncTrigger ────┼──→ SyncScheduler ──→ SyncOrchestrator::run
//! backoff expiry ─┘          │
//!                      shutdown token
//! ```
//!
//! Triggers are coalesced: at most one request waits while a run is in
//! flight. Shutdown cancels the in-flight run, which leaves the cursor
//! untouched.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{RunOutcome, SyncOrchestrator};

/// Handle for requesting an immediate sync run
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Requests a run; returns false once the scheduler has stopped
    ///
    /// A request made while another one is pending is merged into it.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Runs the orchestrator periodically and on demand until shut down
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> (Self, SyncTrigger) {
        let (tx, trigger_rx) = mpsc::channel(1);
        info!(interval_secs = interval.as_secs(), "Creating sync scheduler");
        let scheduler = Self {
            orchestrator,
            interval,
            trigger_rx,
        };
        (scheduler, SyncTrigger { tx })
    }

    /// Main loop; the first run starts immediately
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Sync scheduler starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let retry_at = self
                .orchestrator
                .backoff_remaining()
                .filter(|remaining| !remaining.is_zero())
                .map(|remaining| Instant::now() + remaining);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => debug!("Periodic sync due"),
                Some(()) = self.trigger_rx.recv() => debug!("Sync requested"),
                _ = sleep_until(retry_at) => debug!("Backoff elapsed"),
            }

            self.run_once(&shutdown).await;
        }

        info!("Sync scheduler stopped");
    }

    async fn run_once(&self, shutdown: &CancellationToken) {
        match self.orchestrator.run(shutdown).await {
            Ok(RunOutcome::Completed(report)) if report.is_degraded() => warn!(
                deferred = report.deferred,
                "Sync completed with changes still pending"
            ),
            Ok(RunOutcome::Completed(_)) => {}
            Ok(outcome) => debug!(?outcome, "Sync run skipped"),
            Err(err) if err.is_auth() => {
                error!(error = %err, "Sync stopped until the account is logged in again")
            }
            Err(err) if err.is_retryable() => warn!(error = %err, "Sync run failed, will retry"),
            Err(err) => error!(error = %err, "Sync run failed and needs attention"),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
