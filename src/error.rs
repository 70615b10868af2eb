//! Error types for Trueno-Lineage
//!
//! Two layers of failure exist in a tracked call:
//! - the wrapped computation failed ([`TrackedError::Operation`], passed through verbatim)
//! - the tracking layer itself failed ([`Error`], wrapped in [`TrackedError::Tracking`])

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Lineage error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid split fractions, malformed pipeline step list, bad settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing or mismatched columns
    #[error("Schema error: {0}")]
    Schema(String),

    /// Operation attempted in a run state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Backend sync failed (retries exhausted or batch rejected)
    #[error("Sync failed after {attempts} attempt(s): {message}\nThe delta is kept; call sync() again to retry.")]
    Sync {
        /// Number of transport attempts made
        attempts: u32,
        /// Last transport or backend error
        message: String,
    },

    /// Object could not be fingerprinted (unsupported column type, unserializable params)
    #[error("Fingerprint error: {0}")]
    Fingerprint(String),

    /// Adding the edge would close a cycle in the lineage graph
    #[error("Lineage cycle: edge {from} -> {to} would make the graph cyclic")]
    LineageCycle {
        /// Source node reference
        from: String,
        /// Target node reference
        to: String,
    },

    /// Local cache storage error (Parquet)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure of a tracked call.
///
/// `Operation` carries the wrapped computation's own error value untouched, so
/// callers observe exactly what the underlying library raised. No lineage is
/// recorded for a call that ends in either variant.
#[derive(Error, Debug)]
pub enum TrackedError<E> {
    /// The underlying operation failed
    #[error(transparent)]
    Operation(E),

    /// The tracking layer failed (validation, fingerprinting, graph, state)
    #[error(transparent)]
    Tracking(#[from] Error),
}

impl<E> TrackedError<E> {
    /// Returns the underlying operation error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Tracking(_) => None,
        }
    }

    /// Returns the tracking-layer error, if that is what failed.
    pub const fn tracking(&self) -> Option<&Error> {
        match self {
            Self::Operation(_) => None,
            Self::Tracking(e) => Some(e),
        }
    }

    /// True when the wrapped computation itself failed.
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}

impl From<TrackedError<std::convert::Infallible>> for Error {
    fn from(err: TrackedError<std::convert::Infallible>) -> Self {
        match err {
            TrackedError::Operation(never) => match never {},
            TrackedError::Tracking(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("solver diverged at iteration {0}")]
    struct SolverError(u32);

    #[test]
    fn test_operation_error_is_transparent() {
        let err: TrackedError<SolverError> = TrackedError::Operation(SolverError(7));
        assert_eq!(err.to_string(), "solver diverged at iteration 7");
        assert!(err.is_operation());
        assert_eq!(err.into_operation(), Some(SolverError(7)));
    }

    #[test]
    fn test_tracking_error_from() {
        let err: TrackedError<SolverError> = Error::Schema("missing column 'y'".into()).into();
        assert!(!err.is_operation());
        assert!(matches!(err.tracking(), Some(Error::Schema(_))));
        assert!(err.to_string().contains("missing column 'y'"));
    }
}
