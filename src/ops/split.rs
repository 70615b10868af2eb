//! Random-split interceptor

use super::{column_index, dataset_spec, input_ref, LineagePlan, TrackedOperation};
use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::fingerprint::Fingerprinter;
use crate::lineage::{NodeAttributes, NodeSpec, OperationKind, SplitAttributes};
use crate::split::{partition_indices, stratum_keys, take_partitions, validate_fractions};
use crate::Result;
use arrow::record_batch::RecordBatch;
use std::convert::Infallible;

/// Partition a frame by seeded shuffle, optionally stratified.
///
/// Lineage: `input -split-> split`, `split -split-> partition` for each partition.
#[derive(Debug, Clone)]
pub struct RandomSplit<'a> {
    frame: &'a RecordBatch,
    fractions: Vec<f64>,
    seed: u64,
    stratify_column: Option<String>,
}

impl<'a> RandomSplit<'a> {
    /// Split `frame` into `fractions` with `seed`
    #[must_use]
    pub fn new(frame: &'a RecordBatch, fractions: &[f64], seed: u64) -> Self {
        Self {
            frame,
            fractions: fractions.to_vec(),
            seed,
            stratify_column: None,
        }
    }

    /// Preserve the value proportions of `column` in every partition
    #[must_use]
    pub fn stratify_by(mut self, column: impl Into<String>) -> Self {
        self.stratify_column = Some(column.into());
        self
    }
}

impl TrackedOperation for RandomSplit<'_> {
    type Output = Vec<RecordBatch>;
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "random_split"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Split
    }

    fn validate(&self, config: &TrackingConfig) -> Result<()> {
        validate_fractions(&self.fractions, config.fraction_tolerance)?;
        if let Some(column) = &self.stratify_column {
            column_index(self.frame, column, "stratify")?;
        }
        Ok(())
    }

    fn inputs(&self, fingerprinter: &Fingerprinter) -> Result<Vec<NodeSpec>> {
        Ok(vec![dataset_spec(fingerprinter, self.frame, None)?])
    }

    fn execute(&mut self) -> std::result::Result<Vec<RecordBatch>, TrackedError<Infallible>> {
        let strata = self
            .stratify_column
            .as_deref()
            .map(|c| stratum_keys(self.frame, c))
            .transpose()?;
        let partitions = partition_indices(
            self.frame.num_rows(),
            &self.fractions,
            self.seed,
            strata.as_deref(),
        );
        Ok(take_partitions(self.frame, &partitions)?)
    }

    fn outputs(
        &self,
        fingerprinter: &Fingerprinter,
        inputs: &[NodeSpec],
        output: &Vec<RecordBatch>,
    ) -> Result<LineagePlan> {
        let input = input_ref(inputs, 0)?;
        let partitions = output
            .iter()
            .map(|p| dataset_spec(fingerprinter, p, None))
            .collect::<Result<Vec<_>>>()?;

        let split = NodeSpec::new(
            fingerprinter.split(
                &input.fingerprint,
                &self.fractions,
                self.seed,
                self.stratify_column.as_deref(),
            ),
            NodeAttributes::Split(SplitAttributes {
                fractions: self.fractions.clone(),
                seed: self.seed,
                stratify_column: self.stratify_column.clone(),
                partitions: partitions.iter().map(|p| p.fingerprint).collect(),
            }),
        );

        let mut plan = LineagePlan::new();
        let split = plan.output(split);
        plan.edge(input, split, OperationKind::Split);
        for partition in partitions {
            let partition = plan.output(partition);
            // A single full-size partition is the input itself.
            if partition != input {
                plan.edge(split, partition, OperationKind::Split);
            }
        }
        Ok(plan)
    }
}
