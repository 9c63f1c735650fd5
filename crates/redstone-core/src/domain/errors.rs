//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, hierarchy violations and identifier errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Generic validation failure (e.g. an empty title)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid sync cursor or revision token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The referenced record does not exist locally
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record is tombstoned and can no longer be mutated
    #[error("Record is deleted: {0}")]
    Tombstoned(String),

    /// The requested parent cannot hold the record
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// The move would make a folder its own ancestor
    #[error("Folder cycle: {0}")]
    Cycle(String),
}

impl DomainError {
    /// Returns true for errors caused by invalid user input
    ///
    /// These are rejected before anything is written, so they never turn
    /// into dirty records.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationFailed(_)
                | DomainError::InvalidParent(_)
                | DomainError::Cycle(_)
        )
    }
}
