//! Folders command - Work with folders in the local replica

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use clap::Subcommand;

use redstone_core::domain::{Record, RecordId, RecordKind};
use redstone_core::ports::RecordFilter;
use redstone_core::usecases::ChangeTracker;

use super::files::report_change;
use super::{parse_record_id, record_json, sync_marker};
use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum FoldersCommand {
    /// List folders
    List,
    /// Show folders and files as a tree
    Tree,
    /// Create a folder
    New {
        name: String,
        /// Parent folder
        #[arg(long)]
        parent: Option<String>,
    },
    /// Rename a folder
    Rename { id: String, name: String },
    /// Move a file or folder into another folder, or to the top level
    Mv {
        /// File or folder id
        id: String,
        /// Destination folder; the top level when omitted
        #[arg(long)]
        to: Option<String>,
    },
    /// Delete a folder
    Rm { id: String },
}

impl FoldersCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let store = ctx.open_store().await?;
        let tracker = ChangeTracker::new(store.clone());

        match self {
            FoldersCommand::List => {
                let folders = store
                    .list(&RecordFilter::new().with_kind(RecordKind::Folder))
                    .await?;
                if format.is_json() {
                    let items: Vec<_> = folders.iter().map(record_json).collect();
                    formatter.print_json(&serde_json::json!({
                        "count": folders.len(),
                        "folders": items,
                    }));
                } else if folders.is_empty() {
                    formatter.info("No folders");
                } else {
                    for folder in &folders {
                        println!(
                            "{} {:<38} {}",
                            sync_marker(folder),
                            folder.id(),
                            folder.payload().label()
                        );
                    }
                    formatter.info(&plural(folders.len(), "folder"));
                }
            }
            FoldersCommand::Tree => {
                let records = store.list(&RecordFilter::new()).await?;
                if format.is_json() {
                    formatter.print_json(&tree_json(&records));
                } else if records.is_empty() {
                    formatter.info("Nothing here yet");
                } else {
                    for line in render_tree(&records) {
                        println!("{line}");
                    }
                }
            }
            FoldersCommand::New { name, parent } => {
                let parent = parent.as_deref().map(parse_record_id).transpose()?;
                let record = tracker.create_folder(name, parent.as_ref()).await?;
                report_change(formatter.as_ref(), format, "Created", &record);
            }
            FoldersCommand::Rename { id, name } => {
                let record = tracker.rename_folder(&parse_record_id(id)?, name).await?;
                report_change(formatter.as_ref(), format, "Renamed", &record);
            }
            FoldersCommand::Mv { id, to } => {
                let to = to.as_deref().map(parse_record_id).transpose()?;
                let record = tracker
                    .move_record(&parse_record_id(id)?, to.as_ref())
                    .await?;
                report_change(formatter.as_ref(), format, "Moved", &record);
            }
            FoldersCommand::Rm { id } => {
                let id = parse_record_id(id)?;
                let changed = tracker.delete(&id).await?;
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "id": id.as_str(),
                        "changed": changed,
                    }));
                } else if changed {
                    formatter.success(&format!("Deleted folder {id}"));
                    formatter.info("Files inside stay where they are until moved or deleted");
                } else {
                    formatter.info(&format!("{id} was already deleted"));
                }
            }
        }
        Ok(())
    }
}

/// Groups live records by the folder they sit in
///
/// Records whose parent is missing or deleted are shown at the top level.
fn children_by_parent(records: &[Record]) -> BTreeMap<Option<&RecordId>, Vec<&Record>> {
    let folders: HashSet<&RecordId> = records
        .iter()
        .filter(|r| r.kind() == RecordKind::Folder)
        .map(Record::id)
        .collect();

    let mut children: BTreeMap<Option<&RecordId>, Vec<&Record>> = BTreeMap::new();
    for record in records {
        let parent = record.parent_ref().filter(|p| folders.contains(p));
        children.entry(parent).or_default().push(record);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            (a.kind() != RecordKind::Folder, a.payload().label())
                .cmp(&(b.kind() != RecordKind::Folder, b.payload().label()))
        });
    }
    children
}

/// Renders records as an indented tree, folders first
fn render_tree(records: &[Record]) -> Vec<String> {
    fn walk(
        parent: Option<&RecordId>,
        depth: usize,
        children: &BTreeMap<Option<&RecordId>, Vec<&Record>>,
        lines: &mut Vec<String>,
    ) {
        let Some(siblings) = children.get(&parent) else {
            return;
        };
        for record in siblings {
            let suffix = if record.kind() == RecordKind::Folder { "/" } else { "" };
            lines.push(format!(
                "{}{}{}{}",
                sync_marker(record),
                "  ".repeat(depth + 1),
                record.payload().label(),
                suffix
            ));
            if record.kind() == RecordKind::Folder {
                walk(Some(record.id()), depth + 1, children, lines);
            }
        }
    }

    let children = children_by_parent(records);
    let mut lines = Vec::new();
    walk(None, 0, &children, &mut lines);
    lines
}

fn tree_json(records: &[Record]) -> serde_json::Value {
    fn node(
        record: &Record,
        children: &BTreeMap<Option<&RecordId>, Vec<&Record>>,
    ) -> serde_json::Value {
        let mut value = record_json(record);
        if record.kind() == RecordKind::Folder {
            let nested: Vec<_> = children
                .get(&Some(record.id()))
                .map(|kids| kids.iter().map(|kid| node(kid, children)).collect())
                .unwrap_or_default();
            value["children"] = nested.into();
        }
        value
    }

    let children = children_by_parent(records);
    let roots: Vec<_> = children
        .get(&None)
        .map(|top| top.iter().map(|r| node(r, &children)).collect())
        .unwrap_or_default();
    serde_json::json!({ "tree": roots })
}
