//! Adapter types that route a wrapped object's calls through a run
//!
//! The adapter owns the wrapped object and exposes only tracked operations plus
//! read-only access, so nothing can mutate it behind the graph's back.

use super::{
    Component, ComputeMetric, EncodeColumn, Estimator, FitTransform, Metric, PipelineFit, Predict,
    Transform, Transformer,
};
use crate::error::TrackedError;
use crate::run::RunContext;
use arrow::record_batch::RecordBatch;

/// A transformer whose calls are recorded in a run.
///
/// # Example
///
/// ```rust,ignore
/// let mut encoder = run.transformer(LabelEncoder::default());
/// let encoded = encoder.encode_column(&frame, "workclass")?;
/// ```
pub struct TrackedTransformer<'r, T> {
    run: &'r RunContext,
    inner: T,
}

impl<'r, T: Transformer> TrackedTransformer<'r, T> {
    /// Wrap `inner` for `run`
    pub const fn new(run: &'r RunContext, inner: T) -> Self {
        Self { run, inner }
    }

    /// The wrapped transformer
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwrap, ending tracking for this object
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Fit on `column` and replace it by `<column><index_suffix>`.
    ///
    /// # Errors
    ///
    /// `Operation` with the transformer's error, `Tracking` for schema or state problems
    pub fn encode_column(
        &mut self,
        frame: &RecordBatch,
        column: &str,
    ) -> Result<RecordBatch, TrackedError<T::Error>> {
        let suffix = self.run.config().index_suffix.clone();
        self.run
            .track(EncodeColumn::new(&mut self.inner, frame, column).with_suffix(suffix))
    }

    /// Fit on `frame`, then transform it.
    ///
    /// # Errors
    ///
    /// `Operation` with the transformer's error, `Tracking` for fingerprint or state problems
    pub fn fit_transform(&mut self, frame: &RecordBatch) -> Result<RecordBatch, TrackedError<T::Error>> {
        self.run.track(FitTransform::new(&mut self.inner, frame))
    }

    /// Transform with the current fitted state.
    ///
    /// # Errors
    ///
    /// `Operation` with the transformer's error, `Tracking` for fingerprint or state problems
    pub fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, TrackedError<T::Error>> {
        self.run.track(Transform::new(&self.inner, frame))
    }
}

/// An estimator or pipeline whose calls are recorded in a run.
pub struct TrackedEstimator<'r, E> {
    run: &'r RunContext,
    inner: E,
}

impl<'r, E: Estimator> TrackedEstimator<'r, E> {
    /// Wrap `inner` for `run`
    pub const fn new(run: &'r RunContext, inner: E) -> Self {
        Self { run, inner }
    }

    /// The wrapped estimator
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    /// Unwrap, ending tracking for this object
    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Train on `features` against the single-column `labels`.
    ///
    /// # Errors
    ///
    /// `Operation` with the estimator's error, `Tracking` for a malformed step
    /// list, mismatched frames, or a closed run
    pub fn fit(
        &mut self,
        features: &RecordBatch,
        labels: &RecordBatch,
    ) -> Result<(), TrackedError<E::Error>> {
        self.run.track(PipelineFit::new(&mut self.inner, features, labels))
    }

    /// Build the evaluation frame: features, optional labels, and predictions.
    ///
    /// # Errors
    ///
    /// `Operation` with the estimator's error, `Tracking` for schema or state problems
    pub fn predict(
        &self,
        features: &RecordBatch,
        labels: Option<&RecordBatch>,
        prediction_column: &str,
    ) -> Result<RecordBatch, TrackedError<E::Error>> {
        let mut op = Predict::new(&self.inner, features, prediction_column);
        if let Some(labels) = labels {
            op = op.with_labels(labels);
        }
        self.run.track(op)
    }

    /// Score an evaluation frame produced by this estimator.
    ///
    /// # Errors
    ///
    /// `Operation` with the metric's error, `Tracking(Schema)` when either
    /// column is missing (checked before the metric runs)
    pub fn evaluate<M: Metric>(
        &self,
        metric: &M,
        frame: &RecordBatch,
        prediction_column: &str,
        label_column: &str,
    ) -> Result<f64, TrackedError<M::Error>> {
        self.run.track(ComputeMetric::new(
            metric,
            &self.inner as &dyn Component,
            frame,
            prediction_column,
            label_column,
        ))
    }
}
