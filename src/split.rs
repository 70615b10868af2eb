//! Deterministic random partitioning of frames
//!
//! Given `(rows, fractions, seed, strata)` the partition is a pure function:
//! rows are shuffled with a seeded `StdRng`, cut at cumulative-rounded
//! boundaries, and each partition keeps the input row order. Partitions are
//! disjoint and together cover every input row exactly once.
//!
//! With a stratification column, each stratum (distinct value, visited in sorted
//! order) is shuffled and dealt so that every partition tracks its global share
//! as strata accumulate: class proportions carry over and partition sizes stay
//! within one row of `fraction * rows`.

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Check split fractions before any data is touched.
///
/// # Errors
///
/// Returns `Configuration` if the list is empty, any fraction is not a finite
/// positive number, or the sum differs from 1.0 by more than `tolerance`
pub fn validate_fractions(fractions: &[f64], tolerance: f64) -> Result<()> {
    if fractions.is_empty() {
        return Err(Error::Configuration("split needs at least one fraction".into()));
    }
    if let Some(bad) = fractions.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
        return Err(Error::Configuration(format!(
            "split fractions must be positive, got {bad}"
        )));
    }
    let sum: f64 = fractions.iter().sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(Error::Configuration(format!(
            "split fractions must sum to 1.0, got {sum} ({fractions:?})"
        )));
    }
    Ok(())
}

/// Partition sizes for `len` items: cumulative boundaries rounded to the nearest
/// row, the last boundary pinned to `len`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn boundaries(len: usize, fractions: &[f64]) -> Vec<usize> {
    let mut cumulative = 0.0;
    let mut bounds = Vec::with_capacity(fractions.len());
    for (i, fraction) in fractions.iter().enumerate() {
        cumulative += fraction;
        let bound = if i + 1 == fractions.len() {
            len
        } else {
            ((len as f64) * cumulative).round().min(len as f64) as usize
        };
        let floor = bounds.last().copied().unwrap_or(0);
        bounds.push(bound.max(floor));
    }
    bounds
}

/// Row indices of each partition, ascending within a partition.
///
/// # Arguments
/// * `num_rows` - Rows in the input
/// * `fractions` - Validated fractions
/// * `seed` - Shuffle seed
/// * `strata` - Optional stratum key per row
#[must_use]
pub fn partition_indices(
    num_rows: usize,
    fractions: &[f64],
    seed: u64,
    strata: Option<&[String]>,
) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); fractions.len()];

    if let Some(keys) = strata {
        let mut by_key: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, key) in keys.iter().enumerate().take(num_rows) {
            by_key.entry(key.as_str()).or_default().push(row);
        }
        let mut seen = 0;
        for mut group in by_key.into_values() {
            group.shuffle(&mut rng);
            seen += group.len();
            let sizes = stratum_allocation(seen, &partitions, fractions, group.len());
            let mut start = 0;
            for (partition, size) in partitions.iter_mut().zip(sizes) {
                partition.extend_from_slice(&group[start..start + size]);
                start += size;
            }
        }
    } else {
        let mut rows: Vec<usize> = (0..num_rows).collect();
        rows.shuffle(&mut rng);
        let mut start = 0;
        for (partition, end) in partitions.iter_mut().zip(boundaries(num_rows, fractions)) {
            partition.extend_from_slice(&rows[start..end]);
            start = end;
        }
    }

    for partition in &mut partitions {
        partition.sort_unstable();
    }
    partitions
}

/// Rows of the next stratum to give each partition.
///
/// Each row goes to the partition furthest below its share `fraction * seen`
/// of all rows visited so far (ties to the lower index). Remainders therefore
/// carry across strata and every partition ends within one row of its share.
#[allow(clippy::cast_precision_loss)]
fn stratum_allocation(
    seen: usize,
    partitions: &[Vec<usize>],
    fractions: &[f64],
    len: usize,
) -> Vec<usize> {
    let mut deficits: Vec<f64> = fractions
        .iter()
        .zip(partitions)
        .map(|(fraction, assigned)| fraction * seen as f64 - assigned.len() as f64)
        .collect();
    let mut sizes = vec![0; fractions.len()];
    for _ in 0..len {
        let neediest = deficits
            .iter()
            .enumerate()
            .fold(0, |best, (i, d)| if *d > deficits[best] { i } else { best });
        sizes[neediest] += 1;
        deficits[neediest] -= 1.0;
    }
    sizes
}

/// Stratum key of every row of `column` (nulls form their own stratum).
///
/// # Errors
///
/// Returns `Schema` if the column is missing, `Arrow` if a value cannot be rendered
pub fn stratum_keys(batch: &RecordBatch, column: &str) -> Result<Vec<String>> {
    let idx = batch
        .schema()
        .index_of(column)
        .map_err(|_| Error::Schema(format!("stratify column '{column}' not found")))?;
    let array = batch.column(idx);
    (0..array.len())
        .map(|row| {
            if array.is_null(row) {
                Ok("\u{0}null".to_string())
            } else {
                array_value_to_string(array, row).map_err(Error::from)
            }
        })
        .collect()
}

/// Materialise partitions by gathering rows.
///
/// # Errors
///
/// Returns `Configuration` for frames beyond `u32::MAX` rows, `Arrow` on kernel failure
pub fn take_partitions(batch: &RecordBatch, partitions: &[Vec<usize>]) -> Result<Vec<RecordBatch>> {
    partitions
        .iter()
        .map(|rows| {
            let indices = rows
                .iter()
                .map(|&r| u32::try_from(r))
                .collect::<std::result::Result<Vec<u32>, _>>()
                .map_err(|_| Error::Configuration("split supports at most u32::MAX rows".into()))?;
            let indices = UInt32Array::from(indices);
            let columns = batch
                .columns()
                .iter()
                .map(|c| take(c.as_ref(), &indices, None))
                .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
            let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));
            Ok(RecordBatch::try_new_with_options(batch.schema(), columns, &options)?)
        })
        .collect()
}

/// Validate, partition, and gather in one call.
///
/// # Errors
///
/// See [`validate_fractions`], [`stratum_keys`], [`take_partitions`]
pub fn random_split(
    batch: &RecordBatch,
    fractions: &[f64],
    seed: u64,
    stratify_column: Option<&str>,
    tolerance: f64,
) -> Result<Vec<RecordBatch>> {
    validate_fractions(fractions, tolerance)?;
    let strata = stratify_column.map(|c| stratum_keys(batch, c)).transpose()?;
    let partitions = partition_indices(batch.num_rows(), fractions, seed, strata.as_deref());
    take_partitions(batch, &partitions)
}
