//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - Durable local replica, superseded edits and cursor
//! - [`IRemoteStore`] - Canonical remote store reached over HTTP
//! - [`IConnectivity`] - Reachability gate consulted before each sync run
//! - [`ICredentialProvider`] - Bearer credential for remote requests

pub mod connectivity;
pub mod credentials;
pub mod local_store;
pub mod remote_store;

pub use connectivity::{AlwaysOnline, IConnectivity};
pub use credentials::{ICredentialProvider, StaticCredentials};
pub use local_store::{ILocalStore, MergeBatch, RecordFilter, StoreStats, TombstoneOrigin};
pub use remote_store::{
    ChangeSet, Changes, IRemoteStore, RemoteError, RemoteRecord, RemoteResult,
};
