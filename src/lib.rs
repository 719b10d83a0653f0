//! # FrostKV
//!
//! A replicated, versioned, read-optimized "frozen" key-value store:
//! - Complete collection versions are fed in bulk and never mutated
//! - Queries hit the most recent version by primary key
//! - Length-prefixed binary protocol over TCP
//! - Client-side aggregator fans feeds out to N replicas
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Aggregator                              │
//! │        (round-robin queries, fan-out feeds)                  │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//! ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼──────┐
//! │ Connector   │    │ Connector   │    │ Connector   │
//! │   Pool      │    │   Pool      │    │   Pool      │
//! └──────┬──────┘    └──────┬──────┘    └──────┬──────┘
//!        │ TCP              │ TCP              │ TCP
//! ┌──────▼──────────────────▼──────────────────▼────────────────┐
//! │                      TCP Server                              │
//! │               (one handler per connection)                   │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────────────┐
//! │                      Data Store                              │
//! │        (collections, versions, atomic swap on feed)          │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────────────┐
//! │                  Collection Store                            │
//! │      (mmap'd segments + in-memory primary-key index)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FrostError, Result};
pub use config::Config;
pub use store::{
    CollectionInfo, CollectionMetadata, DataStore, DirectoryDataStore, IndexDescriptor, Item,
    NullDataStore,
};
pub use network::Server;
pub use client::{Aggregator, Connector, ConnectorPool, ReplicaEndpoint};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FrostKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
