//! Sync command - Push local changes and pull remote ones
//!
//! Runs exactly one orchestrator run. Ctrl-C cancels the run; edits that
//! were not pushed stay dirty and the cursor is not advanced.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use redstone_sync::{RunOutcome, SyncReport};

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let orchestrator = ctx.orchestrator().await?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling sync");
                on_interrupt.cancel();
            }
        });

        if !format.is_json() {
            formatter.info("Syncing...");
        }
        let outcome = orchestrator.run(&cancel).await?;

        if format.is_json() {
            formatter.print_json(&outcome_json(&outcome));
            return Ok(());
        }

        match outcome {
            RunOutcome::Completed(report) => print_report(formatter.as_ref(), &report),
            RunOutcome::Offline => {
                formatter.pending("Server unreachable; local changes stay queued")
            }
            RunOutcome::Cancelled => formatter.pending("Sync cancelled; local changes stay queued"),
            RunOutcome::BackingOff { retry_in } => formatter.warn(&format!(
                "Backing off after failures, retry in {}s",
                retry_in.as_secs()
            )),
            RunOutcome::Coalesced => formatter.info("A sync is already running"),
        }
        Ok(())
    }
}

fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    match outcome {
        RunOutcome::Completed(report) => serde_json::json!({
            "outcome": "completed",
            "report": report,
        }),
        RunOutcome::Offline => serde_json::json!({"outcome": "offline"}),
        RunOutcome::Cancelled => serde_json::json!({"outcome": "cancelled"}),
        RunOutcome::Coalesced => serde_json::json!({"outcome": "coalesced"}),
        RunOutcome::BackingOff { retry_in } => serde_json::json!({
            "outcome": "backing_off",
            "retryInMs": retry_in.as_millis() as u64,
        }),
    }
}

fn print_report(formatter: &dyn OutputFormatter, report: &SyncReport) {
    if report.is_degraded() {
        formatter.pending(&format!(
            "Sync finished, {} still queued",
            plural(report.deferred, "change")
        ));
    } else {
        formatter.success(&format!("Sync finished in {}ms", report.duration_ms));
    }
    formatter.info(&format!(
        "Pushed {}, deleted {} remotely",
        plural(report.pushed, "record"),
        report.deleted_remotely
    ));
    formatter.info(&format!(
        "Pulled {}, {} applied",
        plural(report.pulled, "record"),
        plural(report.tombstones_applied, "deletion")
    ));
    if report.conflicts > 0 || report.resurrected > 0 {
        formatter.info(&format!(
            "Resolved {}, kept {} of remotely deleted records",
            plural(report.conflicts, "conflict"),
            plural(report.resurrected, "edit")
        ));
        formatter.info("Run 'redstone conflicts list' to review superseded versions");
    }
    formatter.info(&format!("Cursor: {}", report.cursor));
}
