//! Scoring interceptors: predict and compute-metric

use super::{
    column_index, component_spec, dataset_spec, input_ref, Component, Estimator, LineagePlan,
    Metric, TrackedOperation,
};
use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::fingerprint::Fingerprinter;
use crate::lineage::{MetricAttributes, NodeAttributes, NodeSpec, OperationKind};
use crate::{Error, Result};
use arrow::array::Array;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Score a frame with a fitted estimator.
///
/// The output is the evaluation frame: feature columns, then the label columns
/// (when given), then the prediction column. Lineage: `model -transform-> scored`,
/// `features -transform-> scored`, `labels -transform-> scored`.
pub struct Predict<'a, E> {
    estimator: &'a E,
    features: &'a RecordBatch,
    labels: Option<&'a RecordBatch>,
    prediction_column: String,
}

impl<'a, E: Estimator> Predict<'a, E> {
    /// Predict over `features`, storing results in `prediction_column`
    pub fn new(
        estimator: &'a E,
        features: &'a RecordBatch,
        prediction_column: impl Into<String>,
    ) -> Self {
        Self {
            estimator,
            features,
            labels: None,
            prediction_column: prediction_column.into(),
        }
    }

    /// Carry ground-truth columns into the evaluation frame
    #[must_use]
    pub fn with_labels(mut self, labels: &'a RecordBatch) -> Self {
        self.labels = Some(labels);
        self
    }

    fn label_column(&self) -> Option<String> {
        self.labels
            .and_then(|l| l.schema().fields().first().map(|f| f.name().clone()))
    }
}

impl<E: Estimator> TrackedOperation for Predict<'_, E> {
    type Output = RecordBatch;
    type Error = E::Error;

    fn name(&self) -> &'static str {
        "predict"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Transform
    }

    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        let mut taken: Vec<String> = self
            .features
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        if let Some(labels) = self.labels {
            if labels.num_rows() != self.features.num_rows() {
                return Err(Error::Schema(format!(
                    "features have {} rows but labels have {}",
                    self.features.num_rows(),
                    labels.num_rows()
                )));
            }
            for field in labels.schema().fields() {
                if taken.contains(field.name()) {
                    return Err(Error::Schema(format!(
                        "label column '{}' collides with a feature column",
                        field.name()
                    )));
                }
                taken.push(field.name().clone());
            }
        }
        if taken.contains(&self.prediction_column) {
            return Err(Error::Schema(format!(
                "prediction column '{}' already exists",
                self.prediction_column
            )));
        }
        Ok(())
    }

    /// `[features, model, labels?]`
    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        let mut specs = vec![
            dataset_spec(fingerprinter, self.features, None)?,
            component_spec(fingerprinter, self.estimator),
        ];
        if let Some(labels) = self.labels {
            let label_column = self.label_column();
            specs.push(dataset_spec(fingerprinter, labels, label_column.as_deref())?);
        }
        Ok(specs)
    }

    fn execute(&mut self) -> std::result::Result<RecordBatch, TrackedError<E::Error>> {
        let predictions = self
            .estimator
            .predict(self.features)
            .map_err(TrackedError::Operation)?;
        if predictions.len() != self.features.num_rows() {
            return Err(Error::Schema(format!(
                "{} returned {} predictions for {} rows",
                self.estimator.component_type(),
                predictions.len(),
                self.features.num_rows()
            ))
            .into());
        }

        let features_schema = self.features.schema();
        let mut fields: Vec<Field> = features_schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let mut columns = self.features.columns().to_vec();
        if let Some(labels) = self.labels {
            fields.extend(labels.schema().fields().iter().map(|f| f.as_ref().clone()));
            columns.extend(labels.columns().iter().cloned());
        }
        fields.push(Field::new(
            self.prediction_column.clone(),
            predictions.data_type().clone(),
            predictions.null_count() > 0,
        ));
        columns.push(predictions);

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| TrackedError::Tracking(e.into()))
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &RecordBatch,
    ) -> Result<LineagePlan> {
        let features = input_ref(inputs, 0)?;
        let model = input_ref(inputs, 1)?;
        let label_column = self.label_column();

        let mut plan = LineagePlan::new();
        let scored = plan.output(dataset_spec(fingerprinter, output, label_column.as_deref())?);
        plan.edge(model, scored, OperationKind::Transform);
        plan.edge(features, scored, OperationKind::Transform);
        if self.labels.is_some() {
            plan.edge(input_ref(inputs, 2)?, scored, OperationKind::Transform);
        }
        Ok(plan)
    }
}

/// Compute one metric over an evaluation frame.
///
/// Both columns are checked before the metric runs. Lineage:
/// `model -evaluate-> metric`, `frame -evaluate-> metric`.
pub struct ComputeMetric<'a, M> {
    metric: &'a M,
    model: &'a dyn Component,
    frame: &'a RecordBatch,
    prediction_column: String,
    label_column: String,
}

impl<'a, M: Metric> ComputeMetric<'a, M> {
    /// Score `frame` with `metric`; `model` is the estimator that produced the predictions
    pub fn new(
        metric: &'a M,
        model: &'a dyn Component,
        frame: &'a RecordBatch,
        prediction_column: impl Into<String>,
        label_column: impl Into<String>,
    ) -> Self {
        Self {
            metric,
            model,
            frame,
            prediction_column: prediction_column.into(),
            label_column: label_column.into(),
        }
    }
}

impl<M: Metric> TrackedOperation for ComputeMetric<'_, M> {
    type Output = f64;
    type Error = M::Error;

    fn name(&self) -> &'static str {
        "compute_metric"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Evaluate
    }

    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        column_index(self.frame, &self.prediction_column, "prediction")?;
        column_index(self.frame, &self.label_column, "label")?;
        Ok(())
    }

    /// `[frame, model]`
    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![
            dataset_spec(fingerprinter, self.frame, Some(self.label_column.as_str()))?,
            component_spec(fingerprinter, self.model),
        ])
    }

    fn execute(&mut self) -> std::result::Result<f64, TrackedError<M::Error>> {
        let predictions = self
            .frame
            .column(column_index(self.frame, &self.prediction_column, "prediction")?);
        let labels = self
            .frame
            .column(column_index(self.frame, &self.label_column, "label")?);
        self.metric
            .compute(labels, predictions)
            .map_err(TrackedError::Operation)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &f64,
    ) -> Result<LineagePlan> {
        let frame = input_ref(inputs, 0)?;
        let model = input_ref(inputs, 1)?;

        let spec = NodeSpec::new(
            fingerprinter.metric(
                self.metric,
                &frame.fingerprint,
                &model.fingerprint,
                &self.prediction_column,
                &self.label_column,
            ),
            NodeAttributes::Metric(MetricAttributes {
                metric: self.metric.component_type().to_string(),
                params: self.metric.params(),
                prediction_column: self.prediction_column.clone(),
                label_column: self.label_column.clone(),
                value: *output,
                dataset: frame.fingerprint,
                model: model.fingerprint,
            }),
        );

        let mut plan = LineagePlan::new();
        let metric = plan.output(spec);
        plan.edge(model, metric, OperationKind::Evaluate);
        plan.edge(frame, metric, OperationKind::Evaluate);
        Ok(plan)
    }
}
