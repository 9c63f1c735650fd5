//! Last-Write-Wins winner selection
//!
//! Both replicas of a record must pick the same winner without talking to
//! each other, so every input to the decision is part of the record itself:
//!
//! 1. the later `updated_at` wins;
//! 2. on equal `updated_at` the lower record id wins;
//! 3. both sides of a merge share one id, so the comparison then falls
//!    through to the lower canonical payload, then the lower parent.
//!
//! Versions with identical payload and parent are not in conflict at all.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use redstone_core::domain::{Payload, Record, RecordId};
use redstone_core::ports::RemoteRecord;

/// Outcome of comparing a local and a remote version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Local,
    Remote,
    /// Same content on both sides; nothing to resolve
    Identical,
}

/// The fields the policy looks at
#[derive(Debug, Clone, Copy)]
pub struct VersionView<'a> {
    pub id: &'a RecordId,
    pub updated_at: DateTime<Utc>,
    pub payload: &'a Payload,
    pub parent_ref: Option<&'a RecordId>,
}

impl<'a> From<&'a Record> for VersionView<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            id: record.id(),
            updated_at: record.updated_at(),
            payload: record.payload(),
            parent_ref: record.parent_ref(),
        }
    }
}

impl<'a> From<&'a RemoteRecord> for VersionView<'a> {
    fn from(remote: &'a RemoteRecord) -> Self {
        Self {
            id: &remote.id,
            updated_at: remote.updated_at,
            payload: &remote.payload,
            parent_ref: remote.parent_ref.as_ref(),
        }
    }
}

/// Orders two versions; `Greater` means `a` wins
fn precedence(a: &VersionView<'_>, b: &VersionView<'_>) -> Ordering {
    a.updated_at
        .cmp(&b.updated_at)
        // lower id wins, so the comparison is reversed
        .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        .then_with(|| b.payload.canonical_bytes().cmp(&a.payload.canonical_bytes()))
        .then_with(|| {
            let a_parent = a.parent_ref.map(RecordId::as_str);
            let b_parent = b.parent_ref.map(RecordId::as_str);
            b_parent.cmp(&a_parent)
        })
}

/// Picks the winner between a local and a remote version
pub fn pick_winner(local: &Record, remote: &RemoteRecord) -> Winner {
    let local = VersionView::from(local);
    let remote = VersionView::from(remote);
    decide(&local, &remote)
}

/// Picks the winner between two arbitrary versions
pub fn decide(local: &VersionView<'_>, remote: &VersionView<'_>) -> Winner {
    if local.payload == remote.payload && local.parent_ref == remote.parent_ref {
        return Winner::Identical;
    }

    match precedence(local, remote) {
        Ordering::Greater => Winner::Local,
        Ordering::Less => Winner::Remote,
        // Unreachable with differing content; keep the remote as a stable choice
        Ordering::Equal => Winner::Remote,
    }
}
