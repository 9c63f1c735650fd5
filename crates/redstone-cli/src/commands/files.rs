//! Files command - Work with files in the local replica
//!
//! Every change is written locally and marked dirty; it reaches the server
//! on the next `redstone sync` (or the next daemon run).

use std::io::Read;

use anyhow::{Context, Result};
use clap::Subcommand;

use redstone_core::domain::{Payload, Record, RecordKind};
use redstone_core::ports::RecordFilter;
use redstone_core::usecases::ChangeTracker;

use super::{parse_record_id, record_json, sync_marker};
use crate::context::AppContext;
use crate::output::{get_formatter, plural, short_id, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum FilesCommand {
    /// List files
    List {
        /// Only files in this folder
        #[arg(long, conflicts_with = "root")]
        folder: Option<String>,
        /// Only files outside any folder
        #[arg(long)]
        root: bool,
        /// Only files with unpushed changes
        #[arg(long)]
        dirty: bool,
        /// Include deleted files that are not purged yet
        #[arg(long)]
        deleted: bool,
        /// Maximum number of files
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one file with its content
    Show {
        /// File id
        id: String,
    },
    /// Create a file
    New {
        /// File title
        title: String,
        /// File content; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
        /// Folder to create the file in
        #[arg(long)]
        folder: Option<String>,
    },
    /// Change a file's title or content
    Edit {
        /// File id
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a file
    Rm {
        /// File id
        id: String,
    },
    /// Find files whose title or content contains the text
    Search {
        text: String,
        #[arg(long)]
        limit: Option<u32>,
    },
}

impl FilesCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let store = ctx.open_store().await?;
        let tracker = ChangeTracker::new(store.clone());

        match self {
            FilesCommand::List {
                folder,
                root,
                dirty,
                deleted,
                limit,
            } => {
                let mut filter = RecordFilter::new().with_kind(RecordKind::File);
                if let Some(folder) = folder {
                    filter = filter.with_parent(Some(parse_record_id(folder)?));
                } else if *root {
                    filter = filter.with_parent(None);
                }
                if *dirty {
                    filter = filter.with_dirty(true);
                }
                if *deleted {
                    filter = filter.including_tombstoned();
                }
                if let Some(limit) = limit {
                    filter = filter.with_limit(*limit);
                }
                let files = store.list(&filter).await?;
                print_listing(formatter.as_ref(), format, &files);
            }
            FilesCommand::Show { id } => {
                let id = parse_record_id(id)?;
                let record = store
                    .get(&id)
                    .await?
                    .filter(|r| r.kind() == RecordKind::File)
                    .with_context(|| format!("File not found: {id}"))?;
                if format.is_json() {
                    formatter.print_json(&record_json(&record));
                } else {
                    print_file(&record);
                }
            }
            FilesCommand::New {
                title,
                content,
                folder,
            } => {
                let content = match content {
                    Some(content) => content.clone(),
                    None => read_stdin()?,
                };
                let folder = folder.as_deref().map(parse_record_id).transpose()?;
                let record = tracker
                    .create_file(title, &content, folder.as_ref())
                    .await?;
                report_change(formatter.as_ref(), format, "Created", &record);
            }
            FilesCommand::Edit { id, title, content } => {
                anyhow::ensure!(
                    title.is_some() || content.is_some(),
                    "Nothing to change: pass --title and/or --content"
                );
                let id = parse_record_id(id)?;
                let record = tracker
                    .edit_file(&id, title.as_deref(), content.as_deref())
                    .await?;
                report_change(formatter.as_ref(), format, "Updated", &record);
            }
            FilesCommand::Rm { id } => {
                let id = parse_record_id(id)?;
                let changed = tracker.delete(&id).await?;
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "id": id.as_str(),
                        "changed": changed,
                    }));
                } else if changed {
                    formatter.success(&format!("Deleted {id}"));
                } else {
                    formatter.info(&format!("{id} was already deleted"));
                }
            }
            FilesCommand::Search { text, limit } => {
                let mut filter = RecordFilter::new()
                    .with_kind(RecordKind::File)
                    .with_text(text.clone());
                if let Some(limit) = limit {
                    filter = filter.with_limit(*limit);
                }
                let files = store.list(&filter).await?;
                print_listing(formatter.as_ref(), format, &files);
            }
        }
        Ok(())
    }
}

fn print_listing(formatter: &dyn OutputFormatter, format: OutputFormat, files: &[Record]) {
    if format.is_json() {
        let items: Vec<_> = files.iter().map(record_json).collect();
        formatter.print_json(&serde_json::json!({
            "count": files.len(),
            "files": items,
        }));
        return;
    }

    if files.is_empty() {
        formatter.info("No files");
        return;
    }
    println!("  {:<38} {:<20} {}", "ID", "UPDATED", "TITLE");
    for file in files {
        println!(
            "{} {:<38} {:<20} {}",
            sync_marker(file),
            short_id(file.id().as_str(), 38),
            file.updated_at().format("%Y-%m-%d %H:%M:%S"),
            file.payload().label()
        );
    }
    formatter.info(&plural(files.len(), "file"));
}

fn print_file(record: &Record) {
    println!("{}", record.payload().label());
    println!("  id:       {}", record.id());
    if let Some(parent) = record.parent_ref() {
        println!("  folder:   {parent}");
    }
    println!("  updated:  {}", record.updated_at().to_rfc3339());
    if let Some(deleted) = record.deleted_at() {
        println!("  deleted:  {}", deleted.to_rfc3339());
    }
    println!(
        "  state:    {}",
        if record.is_dirty() { "pending push" } else { "synced" }
    );
    if let Payload::File { content, .. } = record.payload() {
        println!();
        println!("{content}");
    }
}

/// Prints the outcome of a local change
pub(crate) fn report_change(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    verb: &str,
    record: &Record,
) {
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "record": record_json(record),
        }));
    } else {
        formatter.success(&format!(
            "{verb} {} '{}' ({})",
            record.kind(),
            record.payload().label(),
            record.id()
        ));
    }
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read content from stdin")?;
    Ok(content)
}
