//! Sync client: pushes batches with bounded exponential backoff
//!
//! ## Retry Policy
//!
//! ```text
//! attempt 1 ──fail(network/5xx)──> sleep(initial) ──> attempt 2 ──> ... ──> attempt max
//!     │                                                                    │
//!     └─ 4xx / decode / Rejected: stop immediately                         └─ SyncError
//! ```
//!
//! A `PartiallyAccepted` batch is a success: the store already had some nodes.

use super::batch::{BatchStatus, SyncBatch};
use super::transport::MetadataStore;
use crate::config::SyncConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one successful push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Batch that was accepted
    pub batch_id: Uuid,
    /// `Accepted` or `PartiallyAccepted`
    pub status: BatchStatus,
    /// Nodes the store created
    pub created: usize,
    /// Nodes the store already had
    pub already_existed: usize,
    /// Transport attempts used
    pub attempts: u32,
}

/// Pushes batches to a [`MetadataStore`].
#[derive(Debug)]
pub struct SyncClient<S> {
    store: S,
    config: SyncConfig,
}

impl<S: MetadataStore> SyncClient<S> {
    /// Client for `store` with the retry budget in `config`
    pub const fn new(store: S, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Retry settings
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Upload `batch`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns `Sync` when the store rejects the batch, answers 4xx or an
    /// unreadable body, or when `max_attempts` transient failures occur in a row
    pub async fn push(&self, batch: &SyncBatch) -> Result<SyncResult> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.upload_batch(batch).await {
                Ok(response) if response.status == BatchStatus::Rejected => {
                    let message = response
                        .message
                        .unwrap_or_else(|| "batch rejected by metadata store".to_string());
                    warn!(batch_id = %batch.batch_id, %message, "batch rejected");
                    return Err(Error::Sync {
                        attempts: attempt,
                        message,
                    });
                }
                Ok(response) => {
                    let result = SyncResult {
                        batch_id: batch.batch_id,
                        status: response.status,
                        created: response.created(),
                        already_existed: response.already_existed(),
                        attempts: attempt,
                    };
                    info!(
                        batch_id = %batch.batch_id,
                        status = ?result.status,
                        created = result.created,
                        already_existed = result.already_existed,
                        attempts = attempt,
                        "batch accepted"
                    );
                    return Ok(result);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt - 1);
                    warn!(
                        batch_id = %batch.batch_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay,
                        error = %err,
                        "batch upload failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => {
                    warn!(batch_id = %batch.batch_id, attempt, error = %err, "batch upload failed");
                    return Err(Error::Sync {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
