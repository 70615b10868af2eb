//! Lineage node, edge, and event types

use crate::fingerprint::Fingerprint;
use crate::{Error, Result};
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of artifact a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Tabular frame
    Dataset,
    /// Configured transform, estimator, or composite pipeline
    Transformer,
    /// Partition of a dataset into fractions
    Split,
    /// One metric evaluation
    Metric,
}

impl NodeKind {
    /// Stable lowercase name used on the wire and in the cache file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Transformer => "transformer",
            Self::Split => "split",
            Self::Metric => "metric",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dataset" => Ok(Self::Dataset),
            "transformer" => Ok(Self::Transformer),
            "split" => Ok(Self::Split),
            "metric" => Ok(Self::Metric),
            other => Err(Error::Other(format!("unknown node kind: {other}"))),
        }
    }
}

/// Operation an edge was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Training an estimator or fitting a transformer
    Fit,
    /// Producing a new frame from an existing one
    Transform,
    /// Partitioning a frame
    Split,
    /// Computing a metric
    Evaluate,
    /// Pipeline step membership (step -> composite)
    Compose,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fit => "fit",
            Self::Transform => "transform",
            Self::Split => "split",
            Self::Evaluate => "evaluate",
            Self::Compose => "compose",
        };
        f.write_str(name)
    }
}

/// Identity of a node: kind plus content fingerprint.
///
/// Two nodes with the same `NodeRef` are the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node kind
    pub kind: NodeKind,
    /// Content fingerprint
    pub fingerprint: Fingerprint,
}

impl NodeRef {
    /// Create a node reference
    #[must_use]
    pub const fn new(kind: NodeKind, fingerprint: Fingerprint) -> Self {
        Self { kind, fingerprint }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.fingerprint.short())
    }
}

/// One column of a dataset schema, with its null count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Arrow data type, as displayed
    pub data_type: String,
    /// Whether the field allows nulls
    pub nullable: bool,
    /// Nulls present in the column
    pub null_count: usize,
}

/// Attributes of a dataset node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    /// Columns in frame order
    pub columns: Vec<ColumnSchema>,
    /// Row count
    pub num_rows: usize,
    /// Column holding labels, when the producing operation knows it
    pub label_column: Option<String>,
}

impl DatasetAttributes {
    /// Summarise a frame.
    #[must_use]
    pub fn from_batch(batch: &RecordBatch, label_column: Option<&str>) -> Self {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, column)| ColumnSchema {
                name: field.name().clone(),
                data_type: field.data_type().to_string(),
                nullable: field.is_nullable(),
                null_count: column.null_count(),
            })
            .collect();
        Self {
            columns,
            num_rows: batch.num_rows(),
            label_column: label_column.map(str::to_string),
        }
    }

    /// Column names in frame order
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A named pipeline step, referencing its own transformer node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Step name as declared in the pipeline
    pub name: String,
    /// Fingerprint of the step's transformer node
    pub fingerprint: Fingerprint,
}

/// Attributes of a transformer / estimator / pipeline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerAttributes {
    /// Concrete type name (e.g. `"PCA"`, `"Pipeline"`)
    pub component_type: String,
    /// Parameter set the fingerprint was computed over
    pub params: serde_json::Value,
    /// Ordered steps; empty for leaf components
    pub steps: Vec<PipelineStep>,
}

/// Attributes of a split node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAttributes {
    /// Requested fractions, in partition order
    pub fractions: Vec<f64>,
    /// Seed of the shuffle
    pub seed: u64,
    /// Column rows were stratified by
    pub stratify_column: Option<String>,
    /// Fingerprints of the resulting partitions, in partition order
    pub partitions: Vec<Fingerprint>,
}

/// Attributes of a metric node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAttributes {
    /// Metric name
    pub metric: String,
    /// Metric parameters (averaging, class weights, ...)
    pub params: serde_json::Value,
    /// Column holding predictions
    pub prediction_column: String,
    /// Column holding ground truth
    pub label_column: String,
    /// Computed value
    pub value: f64,
    /// Evaluated dataset
    pub dataset: Fingerprint,
    /// Model that produced the predictions
    pub model: Fingerprint,
}

/// Kind-specific node attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeAttributes {
    /// Dataset node
    Dataset(DatasetAttributes),
    /// Transformer node
    Transformer(TransformerAttributes),
    /// Split node
    Split(SplitAttributes),
    /// Metric node
    Metric(MetricAttributes),
}

impl NodeAttributes {
    /// Node kind these attributes belong to
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Dataset(_) => NodeKind::Dataset,
            Self::Transformer(_) => NodeKind::Transformer,
            Self::Split(_) => NodeKind::Split,
            Self::Metric(_) => NodeKind::Metric,
        }
    }
}

/// A node that has not been inserted into a graph yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Content fingerprint
    pub fingerprint: Fingerprint,
    /// Kind-specific attributes
    pub attributes: NodeAttributes,
}

impl NodeSpec {
    /// Create a node spec
    #[must_use]
    pub const fn new(fingerprint: Fingerprint, attributes: NodeAttributes) -> Self {
        Self {
            fingerprint,
            attributes,
        }
    }

    /// Identity the node will have once inserted
    #[must_use]
    pub const fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.attributes.kind(), self.fingerprint)
    }
}

/// A lineage graph node. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: u64,
    fingerprint: Fingerprint,
    attributes: NodeAttributes,
    created_at: DateTime<Utc>,
}

impl Node {
    pub(crate) fn new(id: u64, spec: NodeSpec) -> Self {
        Self {
            id,
            fingerprint: spec.fingerprint,
            attributes: spec.attributes,
            created_at: Utc::now(),
        }
    }

    /// Position in the run's insertion order
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Node kind
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.attributes.kind()
    }

    /// Content fingerprint
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Node identity
    #[must_use]
    pub const fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.kind(), self.fingerprint)
    }

    /// Kind-specific attributes
    #[must_use]
    pub const fn attributes(&self) -> &NodeAttributes {
        &self.attributes
    }

    /// Creation timestamp
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Dataset attributes, if this is a dataset node
    #[must_use]
    pub const fn as_dataset(&self) -> Option<&DatasetAttributes> {
        match &self.attributes {
            NodeAttributes::Dataset(a) => Some(a),
            _ => None,
        }
    }

    /// Transformer attributes, if this is a transformer node
    #[must_use]
    pub const fn as_transformer(&self) -> Option<&TransformerAttributes> {
        match &self.attributes {
            NodeAttributes::Transformer(a) => Some(a),
            _ => None,
        }
    }

    /// Split attributes, if this is a split node
    #[must_use]
    pub const fn as_split(&self) -> Option<&SplitAttributes> {
        match &self.attributes {
            NodeAttributes::Split(a) => Some(a),
            _ => None,
        }
    }

    /// Metric attributes, if this is a metric node
    #[must_use]
    pub const fn as_metric(&self) -> Option<&MetricAttributes> {
        match &self.attributes {
            NodeAttributes::Metric(a) => Some(a),
            _ => None,
        }
    }
}

/// Directed `produced(from) -> consumed(to)` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    /// Producing node
    pub from: NodeRef,
    /// Consuming node
    pub to: NodeRef,
    /// Operation that connected them
    pub operation: OperationKind,
}

/// One tracked call, in run order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEvent {
    /// 0-based position in the run's event log
    pub sequence: u64,
    /// Interceptor name (e.g. `"encode_column"`)
    pub operation: String,
    /// Operation kind
    pub kind: OperationKind,
    /// Nodes the call consumed
    pub inputs: Vec<NodeRef>,
    /// Nodes the call produced
    pub outputs: Vec<NodeRef>,
    /// When the call was recorded
    pub recorded_at: DateTime<Utc>,
}
