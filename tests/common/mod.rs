//! Shared collaborators for integration tests
//!
//! Small stand-ins for a numerical library: an encoder, a scaler, a threshold
//! classifier, a two-step pipeline, metrics, and metadata stores that fail on
//! demand.

#![allow(dead_code)]

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use trueno_lineage::config::{SyncConfig, TrackingConfig};
use trueno_lineage::experiment::{ExperimentSpec, ProjectSpec};
use trueno_lineage::ops::{Component, Estimator, Metric, Transformer};
use trueno_lineage::run::{RunContext, Tracker};
use trueno_lineage::sync::{
    BatchResponse, MemoryMetadataStore, MetadataStore, SyncBatch, TransportError,
};

// ============================================================================
// Frames
// ============================================================================

/// Census-like frame: `age`, `workclass`, `hours`, `income`.
pub fn census_frame(rows: usize) -> RecordBatch {
    let workclasses = ["Private", "Self-emp", "State-gov"];
    let age: Vec<i64> = (0..rows).map(|i| 20 + (i as i64 * 7) % 50).collect();
    let workclass: Vec<&str> = (0..rows).map(|i| workclasses[i % 3]).collect();
    let hours: Vec<f64> = (0..rows).map(|i| 20.0 + ((i * 13) % 40) as f64).collect();
    let income: Vec<&str> = hours
        .iter()
        .map(|h| if *h > 40.0 { ">50K" } else { "<=50K" })
        .collect();

    let schema = Schema::new(vec![
        Field::new("age", DataType::Int64, false),
        Field::new("workclass", DataType::Utf8, false),
        Field::new("hours", DataType::Float64, false),
        Field::new("income", DataType::Utf8, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(age)),
            Arc::new(StringArray::from(workclass)),
            Arc::new(Float64Array::from(hours)),
            Arc::new(StringArray::from(income)),
        ],
    )
    .unwrap()
}

/// Frame with a single `id` column `0..rows`.
pub fn id_frame(rows: usize) -> RecordBatch {
    let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
    let ids: Vec<i64> = (0..rows as i64).collect();
    RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(ids))]).unwrap()
}

/// Values of an Int64 column.
pub fn i64_column(frame: &RecordBatch, column: &str) -> Vec<i64> {
    let idx = frame.schema().index_of(column).unwrap();
    frame
        .column(idx)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

/// Column names in order.
pub fn column_names(frame: &RecordBatch) -> Vec<String> {
    frame
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

// ============================================================================
// Tracker setup
// ============================================================================

/// Config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> TrackingConfig {
    TrackingConfig::default().sync(SyncConfig::default().max_attempts(3).backoff_ms(1, 2))
}

pub fn memory_tracker() -> Tracker<MemoryMetadataStore> {
    Tracker::new(MemoryMetadataStore::new(), fast_config()).unwrap()
}

pub fn census_run<S: MetadataStore>(tracker: &Tracker<S>) -> RunContext {
    tracker.start_run(
        &ProjectSpec::new("census").author("ana"),
        &ExperimentSpec::Default,
        None,
    )
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MockError(pub String);

impl MockError {
    pub fn new(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Maps the distinct strings of a single column to sorted integer codes.
#[derive(Debug, Default, Clone)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    fn strings(frame: &RecordBatch) -> Result<&StringArray, MockError> {
        frame
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MockError::new("LabelEncoder expects a Utf8 column"))
    }
}

impl Component for LabelEncoder {
    fn component_type(&self) -> &str {
        "LabelEncoder"
    }
}

impl Transformer for LabelEncoder {
    type Error = MockError;

    fn fit(&mut self, frame: &RecordBatch) -> Result<(), MockError> {
        let values = Self::strings(frame)?;
        let mut classes: Vec<String> = values.iter().flatten().map(ToString::to_string).collect();
        classes.sort();
        classes.dedup();
        self.classes = classes;
        Ok(())
    }

    fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, MockError> {
        let values = Self::strings(frame)?;
        let codes = (0..values.len())
            .map(|i| {
                self.classes
                    .iter()
                    .position(|c| c == values.value(i))
                    .map(|p| p as i64)
                    .ok_or_else(|| MockError(format!("unseen label {}", values.value(i))))
            })
            .collect::<Result<Vec<i64>, _>>()?;
        let schema = Schema::new(vec![Field::new(
            frame.schema().field(0).name(),
            DataType::Int64,
            false,
        )]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(codes))])
            .map_err(|e| MockError(e.to_string()))
    }
}

/// Multiplies every Float64 column by `factor`.
#[derive(Debug, Clone)]
pub struct Scale {
    pub factor: f64,
}

impl Component for Scale {
    fn component_type(&self) -> &str {
        "Scale"
    }

    fn params(&self) -> Value {
        json!({ "factor": self.factor })
    }
}

impl Transformer for Scale {
    type Error = MockError;

    fn fit(&mut self, _frame: &RecordBatch) -> Result<(), MockError> {
        Ok(())
    }

    fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, MockError> {
        let columns: Vec<ArrayRef> = frame
            .columns()
            .iter()
            .map(|c| match c.as_any().downcast_ref::<Float64Array>() {
                Some(values) => Arc::new(
                    values
                        .iter()
                        .map(|v| v.map(|x| x * self.factor))
                        .collect::<Float64Array>(),
                ) as ArrayRef,
                None => Arc::clone(c),
            })
            .collect();
        RecordBatch::try_new(frame.schema(), columns).map_err(|e| MockError(e.to_string()))
    }
}

/// Transformer whose fit always fails.
#[derive(Debug, Default)]
pub struct SingularTransformer;

impl Component for SingularTransformer {
    fn component_type(&self) -> &str {
        "PCA"
    }

    fn params(&self) -> Value {
        json!({ "k": 2 })
    }
}

impl Transformer for SingularTransformer {
    type Error = MockError;

    fn fit(&mut self, _frame: &RecordBatch) -> Result<(), MockError> {
        Err(MockError::new("singular matrix"))
    }

    fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, MockError> {
        Ok(frame.clone())
    }
}

/// Predicts 1 when `column` exceeds the mean seen during fit.
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    pub column: String,
    pub threshold: f64,
}

impl ThresholdClassifier {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            threshold: 0.0,
        }
    }

    fn values<'b>(&self, features: &'b RecordBatch) -> Result<&'b Float64Array, MockError> {
        let idx = features
            .schema()
            .index_of(&self.column)
            .map_err(|e| MockError(e.to_string()))?;
        features
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| MockError::new("ThresholdClassifier expects a Float64 column"))
    }
}

impl Component for ThresholdClassifier {
    fn component_type(&self) -> &str {
        "ThresholdClassifier"
    }

    fn params(&self) -> Value {
        json!({ "column": self.column })
    }
}

impl Estimator for ThresholdClassifier {
    type Error = MockError;

    fn fit(&mut self, features: &RecordBatch, _labels: &RecordBatch) -> Result<(), MockError> {
        let values = self.values(features)?;
        if values.is_empty() {
            return Err(MockError::new("cannot fit on an empty frame"));
        }
        self.threshold = values.values().iter().sum::<f64>() / values.len() as f64;
        Ok(())
    }

    fn predict(&self, features: &RecordBatch) -> Result<ArrayRef, MockError> {
        let values = self.values(features)?;
        let predictions: Int64Array = values
            .values()
            .iter()
            .map(|v| i64::from(*v > self.threshold))
            .collect::<Vec<_>>()
            .into();
        Ok(Arc::new(predictions))
    }
}

/// Two-step composite: a scaler feeding a classifier.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub scale_name: String,
    pub clf_name: String,
    pub scale: Scale,
    pub clf: ThresholdClassifier,
}

impl Pipeline {
    pub fn new(column: &str) -> Self {
        Self {
            scale_name: "scale".to_string(),
            clf_name: "clf".to_string(),
            scale: Scale { factor: 0.5 },
            clf: ThresholdClassifier::new(column),
        }
    }

    pub fn with_step_names(mut self, scale: &str, clf: &str) -> Self {
        self.scale_name = scale.to_string();
        self.clf_name = clf.to_string();
        self
    }
}

impl Component for Pipeline {
    fn component_type(&self) -> &str {
        "Pipeline"
    }

    fn steps(&self) -> Vec<(String, &dyn Component)> {
        vec![
            (self.scale_name.clone(), &self.scale as &dyn Component),
            (self.clf_name.clone(), &self.clf as &dyn Component),
        ]
    }
}

impl Estimator for Pipeline {
    type Error = MockError;

    fn fit(&mut self, features: &RecordBatch, labels: &RecordBatch) -> Result<(), MockError> {
        let scaled = self.scale.transform(features)?;
        self.clf.fit(&scaled, labels)
    }

    fn predict(&self, features: &RecordBatch) -> Result<ArrayRef, MockError> {
        let scaled = self.scale.transform(features)?;
        self.clf.predict(&scaled)
    }
}

/// Estimator whose fit never converges.
#[derive(Debug, Default)]
pub struct DivergentEstimator;

impl Component for DivergentEstimator {
    fn component_type(&self) -> &str {
        "LogisticRegression"
    }

    fn params(&self) -> Value {
        json!({ "max_iter": 1 })
    }
}

impl Estimator for DivergentEstimator {
    type Error = MockError;

    fn fit(&mut self, _features: &RecordBatch, _labels: &RecordBatch) -> Result<(), MockError> {
        Err(MockError::new("did not converge"))
    }

    fn predict(&self, _features: &RecordBatch) -> Result<ArrayRef, MockError> {
        Err(MockError::new("model is not fitted"))
    }
}

fn int_values(array: &ArrayRef) -> Result<&Int64Array, MockError> {
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| MockError::new("metric expects Int64 columns"))
}

/// Fraction of matching rows; counts its invocations.
#[derive(Debug, Default)]
pub struct Accuracy {
    pub calls: AtomicUsize,
}

impl Component for Accuracy {
    fn component_type(&self) -> &str {
        "Accuracy"
    }
}

impl Metric for Accuracy {
    type Error = MockError;

    fn compute(&self, labels: &ArrayRef, predictions: &ArrayRef) -> Result<f64, MockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let labels = int_values(labels)?;
        let predictions = int_values(predictions)?;
        if labels.is_empty() {
            return Err(MockError::new("no rows to score"));
        }
        let hits = labels
            .values()
            .iter()
            .zip(predictions.values().iter())
            .filter(|(l, p)| l == p)
            .count();
        Ok(hits as f64 / labels.len() as f64)
    }
}

/// Mean per-class recall, optionally weighted by class frequency.
#[derive(Debug, Clone)]
pub struct Recall {
    pub weighted: bool,
}

impl Component for Recall {
    fn component_type(&self) -> &str {
        "Recall"
    }

    fn params(&self) -> Value {
        json!({ "average": if self.weighted { "weighted" } else { "macro" } })
    }
}

impl Metric for Recall {
    type Error = MockError;

    fn compute(&self, labels: &ArrayRef, predictions: &ArrayRef) -> Result<f64, MockError> {
        let labels = int_values(labels)?.values();
        let predictions = int_values(predictions)?.values();
        let mut classes: Vec<i64> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return Err(MockError::new("no rows to score"));
        }

        let mut total = 0.0;
        for class in &classes {
            let support = labels.iter().filter(|l| *l == class).count();
            let hits = labels
                .iter()
                .zip(predictions.iter())
                .filter(|(l, p)| *l == class && *p == class)
                .count();
            let recall = hits as f64 / support as f64;
            total += if self.weighted {
                recall * support as f64 / labels.len() as f64
            } else {
                recall / classes.len() as f64
            };
        }
        Ok(total)
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Fails the first `failures` uploads with `error`, then delegates.
#[derive(Debug)]
pub struct FlakyStore {
    pub inner: MemoryMetadataStore,
    remaining: AtomicU32,
    calls: AtomicU32,
    batch_ids: parking_lot::Mutex<Vec<uuid::Uuid>>,
    error: TransportError,
}

impl FlakyStore {
    pub fn new(failures: u32, error: TransportError) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            batch_ids: parking_lot::Mutex::new(Vec::new()),
            error,
        }
    }

    pub fn unavailable(failures: u32) -> Self {
        Self::new(
            failures,
            TransportError::Server {
                status: 503,
                message: "service unavailable".to_string(),
            },
        )
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batch id of every upload attempt, in call order.
    pub fn batch_ids(&self) -> Vec<uuid::Uuid> {
        self.batch_ids.lock().clone()
    }

    pub fn fail_next(&self, failures: u32) {
        self.remaining.store(failures, Ordering::SeqCst);
    }
}

impl MetadataStore for FlakyStore {
    fn identity(&self) -> String {
        self.inner.identity()
    }

    async fn upload_batch(&self, batch: &SyncBatch) -> Result<BatchResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_ids.lock().push(batch.batch_id);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(self.error.clone());
        }
        self.inner.upload_batch(batch).await
    }
}

/// Rejects every batch.
#[derive(Debug, Default)]
pub struct RejectingStore {
    pub calls: AtomicU32,
}

impl MetadataStore for RejectingStore {
    fn identity(&self) -> String {
        "rejecting".to_string()
    }

    async fn upload_batch(&self, batch: &SyncBatch) -> Result<BatchResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BatchResponse::rejected(batch.batch_id, "schema version mismatch"))
    }
}
