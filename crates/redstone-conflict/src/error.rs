//! Error types for the conflict engine

use redstone_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur during merge and recovery
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The local record kept changing while a merge was being applied
    #[error("record {record_id} changed concurrently on {attempts} merge attempts")]
    Contended { record_id: String, attempts: u32 },

    /// Superseded edit or record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A domain rule rejected the operation
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
