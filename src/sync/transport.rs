//! Transport to the remote metadata store

use super::batch::{BatchResponse, SyncBatch};
use std::future::Future;
use thiserror::Error;

/// Failure to get a response for a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, timeout, or other failure before a response arrived
    #[error("network error: {0}")]
    Network(String),

    /// The store answered 5xx
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The store answered 4xx
    #[error("client error {status}: {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The response body was not a valid batch response
    #[error("invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Network and 5xx failures may succeed on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

/// Remote metadata store accepting lineage batches.
///
/// Uploads must be idempotent per node fingerprint and per batch id: the
/// client resends the same delta after any failure.
pub trait MetadataStore: Send + Sync {
    /// Stable name of the backend this store writes to (endpoint URL or
    /// instance id); keys the synced-node cache.
    fn identity(&self) -> String;

    /// Upload one batch and return the store's verdict.
    fn upload_batch(
        &self,
        batch: &SyncBatch,
    ) -> impl Future<Output = Result<BatchResponse, TransportError>> + Send;
}
