//! Connectivity port
//!
//! The orchestrator consults this gate before every run; being offline is
//! not an error, the run is simply skipped.

/// Port trait for the reachability check
#[async_trait::async_trait]
pub trait IConnectivity: Send + Sync {
    /// Returns true if the remote store is believed to be reachable
    async fn is_online(&self) -> bool;
}

/// Connectivity gate with a fixed answer
///
/// Useful when reachability is decided elsewhere, and in tests.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait::async_trait]
impl IConnectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}
