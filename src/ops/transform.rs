//! Frame-producing interceptors: encode-column, fit-transform, transform, select

use super::{
    column_index, component_spec, dataset_spec, input_ref, Component, LineagePlan,
    TrackedOperation, Transformer,
};
use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::fingerprint::Fingerprinter;
use crate::lineage::{NodeSpec, OperationKind};
use crate::{Error, Result};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;

const DEFAULT_INDEX_SUFFIX: &str = "_index";

/// Fit an encoder on one column and replace the column, in place, by its
/// encoded form named `<column><suffix>`.
///
/// Lineage: `input -transform-> output`, `encoder -fit-> output`.
pub struct EncodeColumn<'a, T> {
    encoder: &'a mut T,
    frame: &'a RecordBatch,
    column: String,
    suffix: String,
}

impl<'a, T: Transformer> EncodeColumn<'a, T> {
    /// Encode `column` of `frame` with `encoder`
    pub fn new(encoder: &'a mut T, frame: &'a RecordBatch, column: impl Into<String>) -> Self {
        Self {
            encoder,
            frame,
            column: column.into(),
            suffix: DEFAULT_INDEX_SUFFIX.to_string(),
        }
    }

    /// Suffix of the encoded column name
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    fn encoded_name(&self) -> String {
        format!("{}{}", self.column, self.suffix)
    }
}

impl<T: Transformer> TrackedOperation for EncodeColumn<'_, T> {
    type Output = RecordBatch;
    type Error = T::Error;

    fn name(&self) -> &'static str {
        "encode_column"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Fit
    }

    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        let idx = column_index(self.frame, &self.column, "encode")?;
        let encoded = self.encoded_name();
        if let Ok(existing) = self.frame.schema().index_of(&encoded) {
            if existing != idx {
                return Err(Error::Schema(format!(
                    "encoded column '{encoded}' already exists in the frame"
                )));
            }
        }
        Ok(())
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![
            dataset_spec(fingerprinter, self.frame, None)?,
            component_spec(fingerprinter, &*self.encoder),
        ])
    }

    fn execute(&mut self) -> std::result::Result<RecordBatch, TrackedError<T::Error>> {
        let idx = column_index(self.frame, &self.column, "encode")?;
        let single = self.frame.project(&[idx]).map_err(Error::from)?;

        self.encoder.fit(&single).map_err(TrackedError::Operation)?;
        let encoded = self.encoder.transform(&single).map_err(TrackedError::Operation)?;

        if encoded.num_columns() != 1 || encoded.num_rows() != self.frame.num_rows() {
            return Err(Error::Schema(format!(
                "encoder {} returned {} column(s) x {} row(s), expected 1 x {}",
                self.encoder.component_type(),
                encoded.num_columns(),
                encoded.num_rows(),
                self.frame.num_rows()
            ))
            .into());
        }

        let schema = self.frame.schema();
        let encoded_field = encoded.schema().field(0).clone();
        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == idx {
                    Field::new(
                        self.encoded_name(),
                        encoded_field.data_type().clone(),
                        encoded_field.is_nullable(),
                    )
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        let mut columns = self.frame.columns().to_vec();
        columns[idx] = Arc::clone(encoded.column(0));

        let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
        RecordBatch::try_new(Arc::new(schema), columns)
            .map_err(|e| TrackedError::Tracking(e.into()))
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &RecordBatch,
    ) -> Result<LineagePlan> {
        let frame = input_ref(inputs, 0)?;
        let encoder = input_ref(inputs, 1)?;
        let mut plan = LineagePlan::new();
        let out = plan.output(dataset_spec(fingerprinter, output, None)?);
        plan.edge(frame, out, OperationKind::Transform);
        plan.edge(encoder, out, OperationKind::Fit);
        Ok(plan)
    }
}

/// Fit a transformer on a frame and transform that same frame.
///
/// Lineage: `input -transform-> output`, `transformer -fit-> output`.
pub struct FitTransform<'a, T> {
    transformer: &'a mut T,
    frame: &'a RecordBatch,
}

impl<'a, T: Transformer> FitTransform<'a, T> {
    /// Fit `transformer` on `frame`, then transform it
    pub fn new(transformer: &'a mut T, frame: &'a RecordBatch) -> Self {
        Self { transformer, frame }
    }
}

impl<T: Transformer> TrackedOperation for FitTransform<'_, T> {
    type Output = RecordBatch;
    type Error = T::Error;

    fn name(&self) -> &'static str {
        "fit_transform"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Fit
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![
            dataset_spec(fingerprinter, self.frame, None)?,
            component_spec(fingerprinter, &*self.transformer),
        ])
    }

    fn execute(&mut self) -> std::result::Result<RecordBatch, TrackedError<T::Error>> {
        self.transformer.fit(self.frame).map_err(TrackedError::Operation)?;
        self.transformer.transform(self.frame).map_err(TrackedError::Operation)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &RecordBatch,
    ) -> Result<LineagePlan> {
        let frame = input_ref(inputs, 0)?;
        let transformer = input_ref(inputs, 1)?;
        let mut plan = LineagePlan::new();
        let out = plan.output(dataset_spec(fingerprinter, output, None)?);
        plan.edge(frame, out, OperationKind::Transform);
        plan.edge(transformer, out, OperationKind::Fit);
        Ok(plan)
    }
}

/// Apply an already fitted transformer.
///
/// Lineage: `transformer -transform-> output`, `input -transform-> output`.
pub struct Transform<'a, T> {
    transformer: &'a T,
    frame: &'a RecordBatch,
}

impl<'a, T: Transformer> Transform<'a, T> {
    /// Transform `frame` with `transformer`
    pub fn new(transformer: &'a T, frame: &'a RecordBatch) -> Self {
        Self { transformer, frame }
    }
}

impl<T: Transformer> TrackedOperation for Transform<'_, T> {
    type Output = RecordBatch;
    type Error = T::Error;

    fn name(&self) -> &'static str {
        "transform"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Transform
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![
            dataset_spec(fingerprinter, self.frame, None)?,
            component_spec(fingerprinter, self.transformer),
        ])
    }

    fn execute(&mut self) -> std::result::Result<RecordBatch, TrackedError<T::Error>> {
        self.transformer.transform(self.frame).map_err(TrackedError::Operation)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &RecordBatch,
    ) -> Result<LineagePlan> {
        let frame = input_ref(inputs, 0)?;
        let transformer = input_ref(inputs, 1)?;
        let mut plan = LineagePlan::new();
        let out = plan.output(dataset_spec(fingerprinter, output, None)?);
        plan.edge(transformer, out, OperationKind::Transform);
        plan.edge(frame, out, OperationKind::Transform);
        Ok(plan)
    }
}

/// Which columns a [`SelectColumns`] call keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Keep exactly these, in this order
    Keep(Vec<String>),
    /// Keep everything else, in frame order
    Drop(Vec<String>),
}

/// Built-in column projection, identified like any other transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelector {
    selection: ColumnSelection,
}

impl ColumnSelector {
    /// Selector for `selection`
    #[must_use]
    pub const fn new(selection: ColumnSelection) -> Self {
        Self { selection }
    }

    /// The selection
    #[must_use]
    pub const fn selection(&self) -> &ColumnSelection {
        &self.selection
    }

    /// Column positions to project, after checking every named column exists.
    ///
    /// # Errors
    ///
    /// `Schema` for a missing column, `Configuration` for a repeated name
    pub fn indices(&self, frame: &RecordBatch) -> Result<Vec<usize>> {
        let names = match &self.selection {
            ColumnSelection::Keep(names) | ColumnSelection::Drop(names) => names,
        };
        let mut named = Vec::with_capacity(names.len());
        for name in names {
            let idx = column_index(frame, name, "selected")?;
            if named.contains(&idx) {
                return Err(Error::Configuration(format!(
                    "column '{name}' listed more than once"
                )));
            }
            named.push(idx);
        }
        Ok(match &self.selection {
            ColumnSelection::Keep(_) => named,
            ColumnSelection::Drop(_) => (0..frame.num_columns())
                .filter(|i| !named.contains(i))
                .collect(),
        })
    }
}

impl Component for ColumnSelector {
    fn component_type(&self) -> &str {
        "select_columns"
    }

    fn params(&self) -> Value {
        match &self.selection {
            ColumnSelection::Keep(names) => json!({ "keep": names }),
            ColumnSelection::Drop(names) => json!({ "drop": names }),
        }
    }
}

/// Keep or drop columns of a frame.
///
/// Lineage: `selector -transform-> output`, `input -transform-> output`. A
/// selection that keeps the frame intact yields the input node itself and
/// records no self edge.
pub struct SelectColumns<'a> {
    frame: &'a RecordBatch,
    selector: ColumnSelector,
}

impl<'a> SelectColumns<'a> {
    /// Project `frame` through `selection`
    #[must_use]
    pub const fn new(frame: &'a RecordBatch, selection: ColumnSelection) -> Self {
        Self {
            frame,
            selector: ColumnSelector::new(selection),
        }
    }
}

impl TrackedOperation for SelectColumns<'_> {
    type Output = RecordBatch;
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "select_columns"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Transform
    }

    fn validate(&self, _config: &TrackingConfig) -> Result<()> {
        self.selector.indices(self.frame).map(|_| ())
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![
            dataset_spec(fingerprinter, self.frame, None)?,
            component_spec(fingerprinter, &self.selector),
        ])
    }

    fn execute(&mut self) -> std::result::Result<RecordBatch, TrackedError<Infallible>> {
        let indices = self.selector.indices(self.frame)?;
        Ok(self.frame.project(&indices).map_err(Error::from)?)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &RecordBatch,
    ) -> Result<LineagePlan> {
        let frame = input_ref(inputs, 0)?;
        let selector = input_ref(inputs, 1)?;
        let mut plan = LineagePlan::new();
        let out = plan.output(dataset_spec(fingerprinter, output, None)?);
        plan.edge(selector, out, OperationKind::Transform);
        plan.edge(frame, out, OperationKind::Transform);
        Ok(plan)
    }
}
