//! Conflicts command - Review versions that lost a merge
//!
//! Provides the `redstone conflicts` CLI command which:
//! 1. Lists superseded versions in a table format
//! 2. Shows one version in full
//! 3. Restores a version as a new local edit, or discards it

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Subcommand;

use redstone_conflict::ConflictRecovery;
use redstone_core::domain::{Payload, SupersededEdit, SupersededId};

use super::files::report_change;
use super::parse_record_id;
use crate::context::AppContext;
use crate::output::{get_formatter, plural, short_id, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List superseded versions
    List {
        /// Only versions of this record
        #[arg(long)]
        record: Option<String>,
    },
    /// Show a superseded version
    Show { id: String },
    /// Reapply a superseded version as a local edit
    Restore { id: String },
    /// Forget a superseded version
    Discard { id: String },
}

impl ConflictsCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let recovery = ConflictRecovery::new(ctx.open_store().await?);

        match self {
            ConflictsCommand::List { record } => {
                let record = record.as_deref().map(parse_record_id).transpose()?;
                let entries = recovery.list(record.as_ref()).await?;

                if format.is_json() {
                    let items: Vec<_> = entries.iter().map(entry_json).collect();
                    formatter.print_json(&serde_json::json!({
                        "count": entries.len(),
                        "superseded": items,
                    }));
                } else if entries.is_empty() {
                    formatter.success("No superseded versions");
                } else {
                    println!(
                        "{:<36}  {:<14} {:<20} {:<16} {}",
                        "ID", "RECORD", "RECORDED", "REASON", "LABEL"
                    );
                    for entry in &entries {
                        println!(
                            "{:<36}  {:<14} {:<20} {:<16} {}",
                            entry.id,
                            short_id(entry.record_id.as_str(), 14),
                            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.reason,
                            entry.payload.label()
                        );
                    }
                    formatter.info(&plural(entries.len(), "superseded version"));
                }
            }
            ConflictsCommand::Show { id } => {
                let entry = recovery.show(&parse_superseded_id(id)?).await?;
                if format.is_json() {
                    formatter.print_json(&entry_json(&entry));
                } else {
                    print_entry(&entry);
                }
            }
            ConflictsCommand::Restore { id } => {
                let record = recovery.restore(&parse_superseded_id(id)?).await?;
                report_change(formatter.as_ref(), format, "Restored", &record);
            }
            ConflictsCommand::Discard { id } => {
                let id = parse_superseded_id(id)?;
                recovery.discard(&id).await?;
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({"success": true, "id": id.to_string()}));
                } else {
                    formatter.success(&format!("Discarded {id}"));
                }
            }
        }
        Ok(())
    }
}

fn parse_superseded_id(raw: &str) -> Result<SupersededId> {
    SupersededId::from_str(raw).with_context(|| format!("Invalid superseded id '{raw}'"))
}

fn entry_json(entry: &SupersededEdit) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id.to_string(),
        "recordId": entry.record_id.as_str(),
        "kind": entry.kind().as_str(),
        "reason": entry.reason.as_str(),
        "payload": entry.payload,
        "parentRef": entry.parent_ref.as_ref().map(|p| p.as_str()),
        "loserUpdatedAt": entry.loser_updated_at.to_rfc3339(),
        "winnerUpdatedAt": entry.winner_updated_at.to_rfc3339(),
        "replacementId": entry.replacement_id.as_ref().map(|r| r.as_str()),
        "recordedAt": entry.recorded_at.to_rfc3339(),
    })
}

fn print_entry(entry: &SupersededEdit) {
    println!("Superseded {} of {}", entry.kind(), entry.record_id);
    println!("  id:        {}", entry.id);
    println!("  reason:    {}", entry.reason);
    println!("  edited:    {}", entry.loser_updated_at.to_rfc3339());
    println!("  lost to:   {}", entry.winner_updated_at.to_rfc3339());
    if let Some(replacement) = &entry.replacement_id {
        println!("  kept as:   {replacement}");
    }
    match &entry.payload {
        Payload::File { title, content } => {
            println!("  title:     {title}");
            println!();
            println!("{content}");
        }
        Payload::Folder { name } => println!("  name:      {name}"),
    }
}
