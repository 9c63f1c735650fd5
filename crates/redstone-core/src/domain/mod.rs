//! Domain entities and business logic
//!
//! This module contains the core domain types for Redstone:
//! - Newtypes for identifiers, revisions and the sync cursor
//! - Records (files and folders) with their sync metadata
//! - Superseded edits kept for conflict recovery
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod record;
pub mod superseded;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use record::{now_millis, truncate_millis, Payload, Record, RecordKind, RecordParts};
pub use superseded::{SupersedeReason, SupersededEdit};
