//! Census Income Pipeline: Tracked Lineage End to End
//!
//! This demo runs a small income classifier over a synthetic census frame and
//! records every step in a lineage graph:
//! - Label-encode the target column
//! - Split 70/30 with a fixed seed
//! - Fit a two-step pipeline (scaler + threshold classifier)
//! - Score the held-out partition with two metrics
//! - Close the run and sync the graph to an in-memory metadata store
//!
//! Run with: cargo run --example census_pipeline
//! Verbose:  RUST_LOG=trueno_lineage=debug cargo run --example census_pipeline

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use trueno_lineage::config::TrackingConfig;
use trueno_lineage::experiment::{ExperimentSpec, ProjectSpec};
use trueno_lineage::lineage::NodeKind;
use trueno_lineage::ops::{Component, Estimator, Metric, Transformer};
use trueno_lineage::run::Tracker;
use trueno_lineage::sync::MemoryMetadataStore;
use trueno_lineage::telemetry::init_tracing;

#[derive(Error, Debug)]
#[error("{0}")]
struct ModelError(String);

/// Sorted string-to-index encoder
#[derive(Default)]
struct StringIndexer {
    labels: Vec<String>,
}

impl StringIndexer {
    fn column(frame: &RecordBatch) -> Result<&StringArray, ModelError> {
        frame
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ModelError("expected a string column".into()))
    }
}

impl Component for StringIndexer {
    fn component_type(&self) -> &str {
        "StringIndexer"
    }

    fn params(&self) -> Value {
        json!({ "order": "alphabetical" })
    }
}

impl Transformer for StringIndexer {
    type Error = ModelError;

    fn fit(&mut self, frame: &RecordBatch) -> Result<(), ModelError> {
        let mut labels: Vec<String> = Self::column(frame)?
            .iter()
            .flatten()
            .map(str::to_string)
            .collect();
        labels.sort();
        labels.dedup();
        self.labels = labels;
        Ok(())
    }

    fn transform(&self, frame: &RecordBatch) -> Result<RecordBatch, ModelError> {
        let values = Self::column(frame)?;
        let mut codes = Vec::with_capacity(values.len());
        for value in values.iter().flatten() {
            let code = self
                .labels
                .iter()
                .position(|l| l == value)
                .ok_or_else(|| ModelError(format!("unseen label {value}")))?;
            codes.push(code as i64);
        }
        let field = Field::new(frame.schema().field(0).name(), DataType::Int64, false);
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![field])),
            vec![Arc::new(Int64Array::from(codes))],
        )
        .map_err(|e| ModelError(e.to_string()))
    }
}

/// Divides `hours` by a constant
struct HoursScaler {
    divisor: f64,
}

impl Component for HoursScaler {
    fn component_type(&self) -> &str {
        "HoursScaler"
    }

    fn params(&self) -> Value {
        json!({ "divisor": self.divisor })
    }
}

impl HoursScaler {
    fn scale(&self, frame: &RecordBatch) -> Result<Vec<f64>, ModelError> {
        let idx = frame
            .schema()
            .index_of("hours")
            .map_err(|e| ModelError(e.to_string()))?;
        let hours = frame
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| ModelError("hours must be Float64".into()))?;
        Ok(hours.values().iter().map(|h| h / self.divisor).collect())
    }
}

/// Predicts the high-income class above a learned cut-off
struct Threshold {
    cutoff: f64,
}

impl Component for Threshold {
    fn component_type(&self) -> &str {
        "Threshold"
    }
}

/// Scaler followed by a threshold classifier
struct IncomePipeline {
    scaler: HoursScaler,
    classifier: Threshold,
}

impl Component for IncomePipeline {
    fn component_type(&self) -> &str {
        "Pipeline"
    }

    fn steps(&self) -> Vec<(String, &dyn Component)> {
        vec![
            ("scaler".to_string(), &self.scaler as &dyn Component),
            ("classifier".to_string(), &self.classifier as &dyn Component),
        ]
    }
}

impl Estimator for IncomePipeline {
    type Error = ModelError;

    fn fit(&mut self, features: &RecordBatch, _labels: &RecordBatch) -> Result<(), ModelError> {
        let scaled = self.scaler.scale(features)?;
        if scaled.is_empty() {
            return Err(ModelError("empty training frame".into()));
        }
        self.classifier.cutoff = scaled.iter().sum::<f64>() / scaled.len() as f64;
        Ok(())
    }

    fn predict(&self, features: &RecordBatch) -> Result<ArrayRef, ModelError> {
        let scaled = self.scaler.scale(features)?;
        let predictions: Vec<i64> = scaled
            .iter()
            .map(|v| i64::from(*v > self.classifier.cutoff))
            .collect();
        Ok(Arc::new(Int64Array::from(predictions)))
    }
}

/// Precision or recall of the positive class
struct BinaryScore {
    name: &'static str,
}

impl Component for BinaryScore {
    fn component_type(&self) -> &str {
        self.name
    }

    fn params(&self) -> Value {
        json!({ "positive_label": 1 })
    }
}

impl Metric for BinaryScore {
    type Error = ModelError;

    fn compute(&self, labels: &ArrayRef, predictions: &ArrayRef) -> Result<f64, ModelError> {
        let ints = |a: &ArrayRef| {
            a.as_any()
                .downcast_ref::<Int64Array>()
                .map(|a| a.values().to_vec())
                .ok_or_else(|| ModelError("expected Int64 columns".into()))
        };
        let (labels, predictions) = (ints(labels)?, ints(predictions)?);
        let pairs = labels.iter().zip(&predictions);
        let true_pos = pairs.clone().filter(|(l, p)| **l == 1 && **p == 1).count() as f64;
        let denominator = if self.name == "Precision" {
            pairs.filter(|(_, p)| **p == 1).count()
        } else {
            pairs.filter(|(l, _)| **l == 1).count()
        };
        Ok(if denominator == 0 { 0.0 } else { true_pos / denominator as f64 })
    }
}

fn census_frame(rows: usize) -> Result<RecordBatch> {
    let workclasses = ["Private", "Self-emp", "State-gov", "Federal-gov"];
    let age: Vec<i64> = (0..rows).map(|i| 18 + (i as i64 * 11) % 60).collect();
    let workclass: Vec<&str> = (0..rows).map(|i| workclasses[(i * 7) % 4]).collect();
    let hours: Vec<f64> = (0..rows).map(|i| 15.0 + ((i * 17) % 50) as f64).collect();
    let income: Vec<&str> = hours
        .iter()
        .zip(&age)
        .map(|(h, a)| if *h + (*a as f64) / 4.0 > 52.0 { ">50K" } else { "<=50K" })
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
    .context("building census frame")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("trueno_lineage=info");

    println!("=== Trueno-Lineage: Census Income Pipeline ===\n");

    let tracker = Tracker::new(MemoryMetadataStore::new(), TrackingConfig::default())?;
    let run = tracker.start_run(
        &ProjectSpec::new("census-income")
            .author("data-team")
            .description("Income classification on census extracts"),
        &ExperimentSpec::Named("threshold-baseline".into()),
        Some("hours-only baseline"),
    );
    println!("Run {} in experiment '{}'", run.run_id(), run.experiment().name());

    // Step 1: encode the target
    let frame = census_frame(1_000)?;
    let mut indexer = run.transformer(StringIndexer::default());
    let encoded = indexer.encode_column(&frame, "income")?;
    println!("\n1. Encoded income labels: {:?}", indexer.inner().labels);

    // Step 2: split
    let parts = run.random_split(&encoded, &[0.7, 0.3], 0)?;
    let (train, test) = (&parts[0], &parts[1]);
    println!("2. Split: {} train rows, {} test rows", train.num_rows(), test.num_rows());

    // Step 3: fit
    let train_features = run.drop_columns(train, &["workclass", "income_index"])?;
    let train_labels = run.select_columns(train, &["income_index"])?;
    let mut model = run.estimator(IncomePipeline {
        scaler: HoursScaler { divisor: 10.0 },
        classifier: Threshold { cutoff: 0.0 },
    });
    model.fit(&train_features, &train_labels)?;
    println!("3. Fitted pipeline, cut-off = {:.3}", model.inner().classifier.cutoff);

    // Step 4: score
    let test_features = run.drop_columns(test, &["workclass", "income_index"])?;
    let test_labels = run.select_columns(test, &["income_index"])?;
    let scored = model.predict(&test_features, Some(&test_labels), "prediction")?;
    println!("4. Metrics on {} held-out rows:", scored.num_rows());
    for name in ["Precision", "Recall"] {
        let value = model.evaluate(&BinaryScore { name }, &scored, "prediction", "income_index")?;
        println!("   {name:<10} {value:.3}");
    }

    // Step 5: lineage
    let graph = run.graph();
    println!("\n=== Lineage Graph ===");
    for kind in [NodeKind::Dataset, NodeKind::Transformer, NodeKind::Split, NodeKind::Metric] {
        let count = graph.nodes().iter().filter(|n| n.kind() == kind).count();
        println!("  {:<12} {count}", kind.as_str());
    }
    println!("  {:<12} {}", "edges", graph.edge_count());
    println!("  {:<12} {}", "events", graph.event_count());
    println!("  acyclic:     {}", graph.is_acyclic());

    // Step 6: close and sync
    tracker.close_run(&run)?;
    let report = tracker.sync(&run).await?;
    println!("\n=== Sync ===");
    println!("  status:          {:?}", report.status);
    println!("  nodes sent:      {}", report.nodes_sent);
    println!("  edges sent:      {}", report.edges_sent);
    println!("  events sent:     {}", report.events_sent);
    println!("  attempts:        {}", report.attempts);

    let again = tracker.sync(&run).await?;
    println!("  second sync:     {}", if again.is_noop() { "nothing to send" } else { "uploaded" });

    Ok(())
}
