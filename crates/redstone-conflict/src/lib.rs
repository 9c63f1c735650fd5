//! Redstone Conflict - Merge policy and conflict resolution
//!
//! Provides:
//! - Last-Write-Wins winner selection with a deterministic tie-break
//! - Merge planning for remote upserts and deletions against local state
//! - The resolver that applies plans atomically to the local store
//! - Recovery of superseded (losing) edits

pub mod detector;
pub mod error;
pub mod policy;
pub mod resolver;
pub mod use_cases;

pub use detector::{DeletePlan, UpsertPlan};
pub use error::ConflictError;
pub use policy::{pick_winner, Winner};
pub use resolver::{ConflictResolver, MergeOutcome};
pub use use_cases::ConflictRecovery;
