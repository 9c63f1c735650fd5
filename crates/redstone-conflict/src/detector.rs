//! Merge planning
//!
//! Decides what a remote change means for the local copy of a record. The
//! functions here are pure: they look at the local record as read from the
//! store and return a plan; the resolver turns the plan into a
//! [`MergeBatch`](redstone_core::ports::MergeBatch).

use tracing::debug;

use redstone_core::domain::Record;
use redstone_core::ports::RemoteRecord;

use crate::policy::{pick_winner, Winner};

/// What to do with a remote upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    /// No local copy, or a clean one at another revision: take the remote
    Materialize,
    /// Nothing to do (revision already applied)
    Skip,
    /// The id is deleted or retired locally and stays dead
    IgnoreDead,
    /// Same content on both sides: adopt the remote version, clear dirty
    Converge,
    /// Dirty local loses: keep it as a superseded edit, take the remote
    RemoteWins,
    /// Dirty local wins: keep it, adopt the remote revision, stay dirty
    LocalWins,
}

/// What to do with a remote deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePlan {
    /// Never seen locally: remember the id so it is never revived
    Retire,
    /// Already deleted locally and nothing pending
    Skip,
    /// Apply the tombstone (clean record, or a pending local delete)
    Tombstone,
    /// Unsynced local edit: keep it under a fresh id
    Resurrect,
}

/// Plans the merge of a remote upsert into the local state
pub fn plan_upsert(local: Option<&Record>, retired: bool, remote: &RemoteRecord) -> UpsertPlan {
    let Some(local) = local else {
        return if retired {
            UpsertPlan::IgnoreDead
        } else {
            UpsertPlan::Materialize
        };
    };

    if local.is_tombstoned() {
        return UpsertPlan::IgnoreDead;
    }

    // A clean copy follows the server whenever the revision moved; device
    // clocks may disagree, so `updated_at` is not compared here.
    if !local.is_dirty() {
        if local.remote_revision() == Some(&remote.revision) {
            return UpsertPlan::Skip;
        }
        return UpsertPlan::Materialize;
    }

    // Dirty from here on. A remote that still carries the revision this
    // replica last acknowledged has not moved: the pending push covers it.
    if local.remote_revision() == Some(&remote.revision) {
        return UpsertPlan::Skip;
    }

    let plan = match pick_winner(local, remote) {
        Winner::Identical => UpsertPlan::Converge,
        Winner::Remote => UpsertPlan::RemoteWins,
        Winner::Local => UpsertPlan::LocalWins,
    };
    debug!(
        record_id = %local.id(),
        local_updated_at = %local.updated_at(),
        remote_updated_at = %remote.updated_at,
        ?plan,
        "Dirty record changed remotely"
    );
    plan
}

/// Plans the merge of a remote deletion into the local state
pub fn plan_delete(local: Option<&Record>) -> DeletePlan {
    match local {
        None => DeletePlan::Retire,
        Some(record) if record.is_tombstoned() => {
            if record.is_dirty() {
                DeletePlan::Tombstone
            } else {
                DeletePlan::Skip
            }
        }
        Some(record) if record.is_dirty() => DeletePlan::Resurrect,
        Some(_) => DeletePlan::Tombstone,
    }
}
