//! CLI subcommands

pub mod auth;
pub mod config;
pub mod conflicts;
pub mod files;
pub mod folders;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use redstone_core::domain::{Payload, Record, RecordId};

/// Parses a record id given on the command line
pub(crate) fn parse_record_id(raw: &str) -> Result<RecordId> {
    RecordId::new(raw).with_context(|| format!("Invalid record id '{raw}'"))
}

/// Machine-readable view of a record
pub(crate) fn record_json(record: &Record) -> serde_json::Value {
    let mut value = serde_json::json!({
        "id": record.id().as_str(),
        "kind": record.kind().as_str(),
        "parentRef": record.parent_ref().map(|p| p.as_str()),
        "createdAt": record.created_at().to_rfc3339(),
        "updatedAt": record.updated_at().to_rfc3339(),
        "deletedAt": record.deleted_at().map(|d| d.to_rfc3339()),
        "dirty": record.is_dirty(),
        "revision": record.remote_revision().map(|r| r.as_str()),
    });
    match record.payload() {
        Payload::File { title, content } => {
            value["title"] = title.as_str().into();
            value["content"] = content.as_str().into();
        }
        Payload::Folder { name } => {
            value["name"] = name.as_str().into();
        }
    }
    value
}

/// Single-character sync marker for listings
pub(crate) fn sync_marker(record: &Record) -> char {
    match (record.is_tombstoned(), record.is_dirty(), record.is_new()) {
        (true, _, _) => 'D',
        (false, true, true) => '+',
        (false, true, false) => '*',
        (false, false, _) => ' ',
    }
}
