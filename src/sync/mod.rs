//! Sync to a remote metadata store
//!
//! Provides incremental, idempotent upload of lineage deltas:
//! - [`SyncBatch`] / [`BatchResponse`]: JSON wire format
//! - [`MetadataStore`]: async transport trait
//! - [`MemoryMetadataStore`]: `DashMap` store with server-side dedup
//! - `HttpMetadataStore`: reqwest transport (feature `http`)
//! - [`SyncClient`]: bounded exponential backoff
//! - [`SyncedCache`]: Parquet file of already-synced node identities
//!
//! # Example
//!
//! ```rust,no_run
//! use trueno_lineage::config::SyncConfig;
//! use trueno_lineage::sync::{MemoryMetadataStore, SyncClient};
//!
//! let client = SyncClient::new(MemoryMetadataStore::new(), SyncConfig::default());
//! assert_eq!(client.store().node_count(), 0);
//! ```

mod batch;
mod cache;
mod client;
#[cfg(feature = "http")]
mod http;
mod memory;
mod transport;

pub use batch::{BatchResponse, BatchStatus, NodeOutcome, Outcome, SyncBatch};
pub use cache::SyncedCache;
pub use client::{SyncClient, SyncResult};
#[cfg(feature = "http")]
pub use http::HttpMetadataStore;
pub use memory::MemoryMetadataStore;
pub use transport::{MetadataStore, TransportError};
