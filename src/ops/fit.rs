//! Pipeline-fit interceptor

use super::{component_spec, dataset_spec, input_ref, Estimator, LineagePlan, TrackedOperation};
use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::fingerprint::Fingerprinter;
use crate::lineage::{NodeSpec, OperationKind};
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;

/// Train an estimator (leaf or composite pipeline) on features and labels.
///
/// Records one transformer node per named step and one composite node that
/// lists the steps in declared order. Lineage: `step -compose-> composite`,
/// `features -fit-> composite`, `labels -fit-> composite`.
pub struct PipelineFit<'a, E> {
    estimator: &'a mut E,
    features: &'a RecordBatch,
    labels: &'a RecordBatch,
}

impl<'a, E: Estimator> PipelineFit<'a, E> {
    /// Fit `estimator` on `features` against the single-column `labels`
    pub fn new(estimator: &'a mut E, features: &'a RecordBatch, labels: &'a RecordBatch) -> Self {
        Self {
            estimator,
            features,
            labels,
        }
    }

    fn label_column(&self) -> Option<String> {
        self.labels.schema().fields().first().map(|f| f.name().clone())
    }
}

/// Step names must be non-empty and unique.
fn validate_steps(names: &[String]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::Configuration("pipeline step with an empty name".into()));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::Configuration(format!(
                "pipeline step name '{name}' is used more than once"
            )));
        }
    }
    Ok(())
}

impl<E: Estimator> TrackedOperation for PipelineFit<'_, E> {
    type Output = ();
    type Error = E::Error;

    fn name(&self) -> &'static str {
        "pipeline_fit"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Fit
    }

    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        let names: Vec<String> = self.estimator.steps().into_iter().map(|(n, _)| n).collect();
        validate_steps(&names)?;

        if self.labels.num_columns() != 1 {
            return Err(Error::Schema(format!(
                "label frame must have exactly one column, got {}",
                self.labels.num_columns()
            )));
        }
        if self.labels.num_rows() != self.features.num_rows() {
            return Err(Error::Schema(format!(
                "features have {} rows but labels have {}",
                self.features.num_rows(),
                self.labels.num_rows()
            )));
        }
        Ok(())
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        let label_column = self.label_column();
        Ok(vec![
            dataset_spec(fingerprinter, self.features, None)?,
            dataset_spec(fingerprinter, self.labels, label_column.as_deref())?,
        ])
    }

    fn execute(&mut self) -> std::result::Result<(), TrackedError<E::Error>> {
        self.estimator
            .fit(self.features, self.labels)
            .map_err(TrackedError::Operation)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        _output: &(),
    ) -> Result<LineagePlan> {
        let features = input_ref(inputs, 0)?;
        let labels = input_ref(inputs, 1)?;
        let mut plan = LineagePlan::new();

        let composite = plan.output(component_spec(fingerprinter, &*self.estimator));
        for (_, step) in self.estimator.steps() {
            let step = plan.output(component_spec(fingerprinter, step));
            plan.edge(step, composite, OperationKind::Compose);
        }
        plan.edge(features, composite, OperationKind::Fit);
        plan.edge(labels, composite, OperationKind::Fit);
        Ok(plan)
    }
}
