//! Use cases (interactors) for Redstone
//!
//! Use cases are thin coordinators that delegate business rules to domain
//! methods and I/O to ports.
//!
//! ## Use Cases
//!
//! - [`ChangeTracker`] - Local creates, edits, moves, deletes and
//!   restoration of superseded edits

pub mod change_tracker;

pub use change_tracker::ChangeTracker;
