//! Redstone Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core of the offline-first
//! sync engine:
//! - **Domain entities** - `Record`, `Payload`, `SupersededEdit`, `SyncCursor`
//! - **Use cases** - `ChangeTracker` (local mutations)
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `IRemoteStore`,
//!   `IConnectivity`, `ICredentialProvider`
//! - **Configuration** - YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`redstone-cache` for the local store, `redstone-api` for the remote store).
//! Use cases coordinate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
