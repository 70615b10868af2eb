//! Operation interceptors
//!
//! Every tracked call is a [`TrackedOperation`] driven by
//! [`RunContext::track`](crate::run::RunContext::track) through the same protocol:
//!
//! 1. `validate` - configuration and schema checks, before any work
//! 2. `inputs` - fingerprint the input artifacts (nothing is inserted yet)
//! 3. `execute` - call the wrapped library; its error passes through verbatim
//! 4. `outputs` - fingerprint the results and plan the edges
//!
//! Only after step 4 succeeds are the input nodes, output nodes, edges, and the
//! event inserted, all inside one graph transaction. A failed call leaves the
//! graph exactly as it was.

mod adapter;
mod evaluate;
mod fit;
mod split;
mod traits;
mod transform;

pub use adapter::{TrackedEstimator, TrackedTransformer};
pub use evaluate::{ComputeMetric, Predict};
pub use fit::PipelineFit;
pub use split::RandomSplit;
pub use traits::{Component, Estimator, Metric, Transformer};
pub use transform::{ColumnSelection, ColumnSelector, EncodeColumn, FitTransform, SelectColumns, Transform};

use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::fingerprint::Fingerprinter;
use crate::lineage::{
    DatasetAttributes, NodeAttributes, NodeRef, NodeSpec, OperationKind, PipelineStep,
    TransformerAttributes,
};
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;

/// One interceptable operation.
pub trait TrackedOperation {
    /// Value returned to the caller
    type Output;

    /// Error raised by the wrapped computation
    type Error;

    /// Operation name recorded in the event log (e.g. `"fit_transform"`)
    fn name(&self) -> &'static str;

    /// Kind recorded on the event
    fn kind(&self) -> OperationKind;

    /// Checks that must pass before anything runs.
    ///
    /// # Errors
    ///
    /// `Configuration` or `Schema`
    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        Ok(())
    }

    /// Input node specs, in a fixed order `outputs` can rely on.
    ///
    /// # Errors
    ///
    /// `Fingerprint` if an input cannot be hashed
    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>>;

    /// Run the wrapped computation.
    ///
    /// # Errors
    ///
    /// `Operation` with the collaborator's error, or `Tracking` when its result
    /// does not fit the contract (e.g. a prediction count mismatch)
    fn execute(&mut self) -> std::result::Result<Self::Output, TrackedError<Self::Error>>;

    /// Output node specs and the edges connecting them.
    ///
    /// # Errors
    ///
    /// `Fingerprint` if an output cannot be hashed
    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &Self::Output,
    ) -> Result<LineagePlan>;
}

/// Edge to add once all nodes of a call exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedEdge {
    /// Source node
    pub from: NodeRef,
    /// Target node
    pub to: NodeRef,
    /// Operation tag
    pub operation: OperationKind,
}

/// What a successful call adds to the graph besides its inputs.
#[derive(Debug, Clone, Default)]
pub struct LineagePlan {
    /// Output node specs
    pub outputs: Vec<NodeSpec>,
    /// Edges, in insertion order
    pub edges: Vec<PlannedEdge>,
}

impl LineagePlan {
    /// Empty plan
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output node; returns its identity.
    pub fn output(&mut self, spec: NodeSpec) -> NodeRef {
        let node_ref = spec.node_ref();
        self.outputs.push(spec);
        node_ref
    }

    /// Add an edge
    pub fn edge(&mut self, from: NodeRef, to: NodeRef, operation: OperationKind) {
        self.edges.push(PlannedEdge { from, to, operation });
    }
}

/// Node spec for a frame.
///
/// # Errors
///
/// `Fingerprint` if a column type has no canonical encoding
pub fn dataset_spec(
    fingerprinter: &Fingerprinter,
    batch: &RecordBatch,
    label_column: Option<&str>,
) -> Result<NodeSpec> {
    Ok(NodeSpec::new(
        fingerprinter.dataset(batch)?,
        NodeAttributes::Dataset(DatasetAttributes::from_batch(batch, label_column)),
    ))
}

/// Node spec for a configured component; composites list their step fingerprints.
#[must_use]
pub fn component_spec(fingerprinter: &Fingerprinter, component: &dyn Component) -> NodeSpec {
    let steps = component
        .steps()
        .into_iter()
        .map(|(name, step)| PipelineStep {
            name,
            fingerprint: fingerprinter.component(step),
        })
        .collect();
    NodeSpec::new(
        fingerprinter.component(component),
        NodeAttributes::Transformer(TransformerAttributes {
            component_type: component.component_type().to_string(),
            params: component.params(),
            steps,
        }),
    )
}

/// Position of `column` in `batch`.
///
/// # Errors
///
/// `Schema` naming the missing column and what it was needed for
pub fn column_index(batch: &RecordBatch, column: &str, role: &str) -> Result<usize> {
    batch.schema().index_of(column).map_err(|_| {
        Error::Schema(format!(
            "{role} column '{column}' not found in frame with columns {:?}",
            batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
        ))
    })
}

/// Input spec at `position`, as planned by the operation's own `inputs`.
pub(crate) fn input_ref(inputs: &[NodeSpec], position: usize) -> Result<NodeRef> {
    inputs
        .get(position)
        .map(NodeSpec::node_ref)
        .ok_or_else(|| Error::Other(format!("missing input node at position {position}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Step(&'static str);

    impl Component for Step {
        fn component_type(&self) -> &str {
            self.0
        }
    }

    struct Composite {
        scaler: Step,
        model: Step,
    }

    impl Component for Composite {
        fn component_type(&self) -> &str {
            "Pipeline"
        }
        fn params(&self) -> Value {
            json!({"memory": null})
        }
        fn steps(&self) -> Vec<(String, &dyn Component)> {
            vec![
                ("scale".to_string(), &self.scaler as &dyn Component),
                ("model".to_string(), &self.model as &dyn Component),
            ]
        }
    }

    #[test]
    fn test_component_spec_lists_steps_in_order() {
        let fp = Fingerprinter::default();
        let pipeline = Composite {
            scaler: Step("StandardScaler"),
            model: Step("LogisticRegression"),
        };
        let spec = component_spec(&fp, &pipeline);
        let NodeAttributes::Transformer(attrs) = &spec.attributes else {
            panic!("expected transformer attributes");
        };
        assert_eq!(attrs.component_type, "Pipeline");
        assert_eq!(attrs.steps.len(), 2);
        assert_eq!(attrs.steps[0].name, "scale");
        assert_eq!(attrs.steps[0].fingerprint, fp.component(&pipeline.scaler));
        assert_eq!(attrs.steps[1].fingerprint, fp.component(&pipeline.model));
    }

    #[test]
    fn test_column_index_reports_missing_column() {
        let schema = Schema::new(vec![Field::new("a", DataType::Int32, false)]);
        let batch =
            RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int32Array::from(vec![1]))])
                .unwrap();
        assert_eq!(column_index(&batch, "a", "label").unwrap(), 0);
        let err = column_index(&batch, "b", "label").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("label column 'b'"));
    }
}
