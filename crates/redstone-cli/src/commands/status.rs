//! Status command - Show replica and sync status

use anyhow::Result;
use clap::Args;

use redstone_core::domain::SyncCursor;
use redstone_core::ports::StoreStats;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let store = ctx.open_store().await?;
        let stats = store.stats().await?;
        let cursor = store.get_cursor().await?;
        let replica = store.replica();

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "user": replica.user_id,
                "deviceId": replica.device_id.to_string(),
                "server": ctx.config.remote.base_url,
                "cursor": cursor.as_ref().map(SyncCursor::as_str),
                "stats": stats,
            }));
            return Ok(());
        }

        formatter.success(&format!("Account: {}", replica.user_id));
        formatter.info(&format!("Device:  {}", replica.device_id));
        formatter.info(&format!("Server:  {}", ctx.config.remote.base_url));
        match cursor {
            Some(cursor) => formatter.info(&format!("Last synced up to {cursor}")),
            None => formatter.info("Never synced"),
        }
        for line in summary_lines(&stats) {
            formatter.info(&line);
        }
        Ok(())
    }
}

fn summary_lines(stats: &StoreStats) -> Vec<String> {
    let mut lines = vec![format!(
        "{} files, {} folders",
        stats.files, stats.folders
    )];
    if stats.dirty > 0 {
        lines.push(format!("{} local changes waiting to be pushed", stats.dirty));
    } else {
        lines.push("Everything is pushed".to_string());
    }
    if stats.superseded > 0 {
        lines.push(format!(
            "{} superseded versions (see 'redstone conflicts list')",
            stats.superseded
        ));
    }
    lines
}
