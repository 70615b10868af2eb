//! Tracking and sync configuration
//!
//! Settings are plain serde structs with defaults, so they can be built in code,
//! loaded from a JSON file, or overlaid from the environment.

use crate::fingerprint::RowOrder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`SyncConfig::endpoint`].
pub const ENV_ENDPOINT: &str = "LINEAGE_SYNC_ENDPOINT";
/// Environment variable overriding [`SyncConfig::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "LINEAGE_SYNC_MAX_ATTEMPTS";
/// Environment variable overriding [`SyncConfig::cache_path`].
pub const ENV_CACHE: &str = "LINEAGE_SYNC_CACHE";

/// Sync client settings: backend location, retry budget, local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the metadata store (HTTP transport only).
    pub endpoint: Option<String>,
    /// Total transport attempts per `sync()` call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single retry delay.
    pub max_backoff_ms: u64,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Per-request timeout for the HTTP transport.
    pub request_timeout_ms: u64,
    /// Parquet file remembering fingerprints already acknowledged by the backend.
    pub cache_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            request_timeout_ms: 30_000,
            cache_path: None,
        }
    }
}

impl SyncConfig {
    /// Set the metadata store base URL
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the attempt limit
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial and maximum backoff delays
    #[must_use]
    pub const fn backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.initial_backoff_ms = initial;
        self.max_backoff_ms = max;
        self
    }

    /// Set the synced-fingerprint cache file
    #[must_use]
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Overlay `LINEAGE_SYNC_*` environment variables on top of `self`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `LINEAGE_SYNC_MAX_ATTEMPTS` is not an integer
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_ATTEMPTS) {
            self.max_attempts = raw.trim().parse().map_err(|e| {
                Error::Configuration(format!("{ENV_MAX_ATTEMPTS}={raw:?} is not a valid count: {e}"))
            })?;
        }
        if let Ok(path) = std::env::var(ENV_CACHE) {
            self.cache_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Defaults overlaid with the environment.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::with_env`]
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Delay before retry number `retry` (0-based), capped at `max_backoff_ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn backoff_for(&self, retry: u32) -> u64 {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        base.min(self.max_backoff_ms as f64) as u64
    }

    /// Check the retry budget is usable.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a zero attempt limit or a shrinking backoff
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration("max_attempts must be at least 1".into()));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(Error::Configuration(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Settings for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Whether row order contributes to dataset fingerprints.
    pub row_order: RowOrder,
    /// Allowed deviation of split fractions from a sum of 1.0.
    pub fraction_tolerance: f64,
    /// Decimal digits split fractions are rounded to before fingerprinting.
    pub fraction_precision: u32,
    /// Suffix appended to a column name by `encode_column`.
    pub index_suffix: String,
    /// Sync client settings.
    pub sync: SyncConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            row_order: RowOrder::Significant,
            fraction_tolerance: 1e-6,
            fraction_precision: 6,
            index_suffix: "_index".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

impl TrackingConfig {
    /// Set the row-order policy for dataset fingerprints
    #[must_use]
    pub const fn row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    /// Set the sync settings
    #[must_use]
    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Load from a JSON file; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check all settings.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` on a non-positive tolerance, excessive precision,
    /// empty suffix, or invalid sync settings
    pub fn validate(&self) -> Result<()> {
        if !(self.fraction_tolerance > 0.0 && self.fraction_tolerance < 1.0) {
            return Err(Error::Configuration(format!(
                "fraction_tolerance must be in (0, 1), got {}",
                self.fraction_tolerance
            )));
        }
        if self.fraction_precision > 12 {
            return Err(Error::Configuration(format!(
                "fraction_precision must be <= 12, got {}",
                self.fraction_precision
            )));
        }
        if self.index_suffix.is_empty() {
            return Err(Error::Configuration("index_suffix must not be empty".into()));
        }
        self.sync.validate()
    }
}
