//! Interfaces of the wrapped numerical library
//!
//! The tracking core never implements fit/transform/score math. It only needs
//! to identify a configured object ([`Component`]) and to call through to it.
//! Each collaborator names its own error type, which reaches the caller of a
//! tracked call unchanged.

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use serde_json::Value;

/// A configured object whose identity is its type, parameters, and steps.
pub trait Component {
    /// Concrete type name, e.g. `"PCA"` or `"Pipeline"`
    fn component_type(&self) -> &str;

    /// Configuration parameters. Key order is irrelevant to the fingerprint.
    fn params(&self) -> Value {
        Value::Null
    }

    /// Named steps, in declared order, for composites. Empty for leaves.
    fn steps(&self) -> Vec<(String, &dyn Component)> {
        Vec::new()
    }
}

/// Frame-to-frame transform (encoder, scaler, decomposition, ...).
pub trait Transformer: Component {
    /// Failure raised by the underlying implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Learn state from `frame`.
    ///
    /// # Errors
    ///
    /// Whatever the implementation raises
    fn fit(&mut self, frame: &RecordBatch) -> Result<(), Self::Error>;

    /// Apply learned state to `frame`.
    ///
    /// # Errors
    ///
    /// Whatever the implementation raises
    fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, Self::Error>;
}

/// Supervised model or composite pipeline ending in one.
pub trait Estimator: Component {
    /// Failure raised by the underlying implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Train on features and a single-column label frame.
    ///
    /// # Errors
    ///
    /// Whatever the implementation raises
    fn fit(&mut self, features: &RecordBatch, labels: &RecordBatch) -> Result<(), Self::Error>;

    /// One prediction per feature row.
    ///
    /// # Errors
    ///
    /// Whatever the implementation raises
    fn predict(&self, features: &RecordBatch) -> Result<ArrayRef, Self::Error>;
}

/// Scalar score over (labels, predictions). `component_type` is the metric name.
pub trait Metric: Component {
    /// Failure raised by the underlying implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Compute the score.
    ///
    /// # Errors
    ///
    /// Whatever the implementation raises
    fn compute(&self, labels: &ArrayRef, predictions: &ArrayRef) -> Result<f64, Self::Error>;
}
