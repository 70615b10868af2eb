//! HTTP metadata store (`POST {endpoint}/v1/lineage/runs/{run_id}/batches`)

use super::batch::{BatchResponse, SyncBatch};
use super::transport::{MetadataStore, TransportError};
use crate::config::SyncConfig;
use crate::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Metadata store reached over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpMetadataStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetadataStore {
    /// Store at `endpoint` (scheme + host + optional prefix).
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    /// Store described by `config.endpoint` and `config.request_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no endpoint is set
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            Error::Configuration("sync endpoint is not set (LINEAGE_SYNC_ENDPOINT)".into())
        })?;
        Self::new(endpoint, Duration::from_millis(config.request_timeout_ms))
    }

    /// Upload URL for a run
    #[must_use]
    pub fn batch_url(&self, run_id: &str) -> String {
        format!("{}/v1/lineage/runs/{run_id}/batches", self.endpoint)
    }
}

impl MetadataStore for HttpMetadataStore {
    fn identity(&self) -> String {
        self.endpoint.clone()
    }

    async fn upload_batch(&self, batch: &SyncBatch) -> std::result::Result<BatchResponse, TransportError> {
        let url = self.batch_url(batch.run_id());
        debug!(%url, batch_id = %batch.batch_id, nodes = batch.nodes.len(), "uploading batch");

        let response = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                TransportError::Server {
                    status: status.as_u16(),
                    message,
                }
            } else {
                TransportError::Client {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        response
            .json::<BatchResponse>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
