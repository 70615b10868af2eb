//! Content fingerprints for lineage deduplication
//!
//! Every artifact that enters the lineage graph is identified by a 256-bit
//! SHA-256 digest of its logical content, never by its memory address:
//! - **Datasets**: schema + row count + cell values
//! - **Components**: type + canonical parameters + ordered step fingerprints
//! - **Splits**: input fingerprint + rounded fractions + seed + stratify column
//! - **Metrics**: metric identity + evaluated dataset + model + column roles
//!
//! Column identity is order-independent (columns are digested by name), while row
//! content is order-dependent unless [`RowOrder::Irrelevant`] is selected.
//!
//! Float cells are hashed by exact bits after canonicalisation: `-0.0` folds into
//! `+0.0` and every NaN payload folds into one NaN. No tolerance is applied.

use crate::config::TrackingConfig;
use crate::ops::Component;
use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Date64Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, LargeBinaryArray,
    LargeStringArray, StringArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version tag mixed into every digest; bump when the encoding changes.
const DIGEST_VERSION: &[u8] = b"trueno-lineage/v1";

/// A 256-bit content-addressed identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding (64 chars).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string.
    ///
    /// # Errors
    ///
    /// Returns `Fingerprint` if the string is not 32 hex-encoded bytes
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::Fingerprint(format!("invalid fingerprint hex {s:?}: {e}")))?;
        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::Fingerprint(format!("fingerprint must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(array))
    }

    /// First 12 hex chars, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Whether row order contributes to a dataset fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Same rows in a different order are a different dataset.
    #[default]
    Significant,
    /// Datasets are compared as multisets of rows.
    Irrelevant,
}

/// Computes fingerprints with a fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    row_order: RowOrder,
    fraction_precision: u32,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(RowOrder::Significant, 6)
    }
}

impl Fingerprinter {
    /// Create a fingerprinter.
    ///
    /// # Arguments
    /// * `row_order` - Row order policy for datasets
    /// * `fraction_precision` - Decimal digits kept from split fractions
    #[must_use]
    pub const fn new(row_order: RowOrder, fraction_precision: u32) -> Self {
        Self {
            row_order,
            fraction_precision,
        }
    }

    /// Create from tracking settings
    #[must_use]
    pub const fn from_config(config: &TrackingConfig) -> Self {
        Self::new(config.row_order, config.fraction_precision)
    }

    /// Row order policy in effect
    #[must_use]
    pub const fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Fingerprint a tabular frame.
    ///
    /// # Errors
    ///
    /// Returns `Fingerprint` if a column has a type without a canonical encoding
    /// (nested, dictionary, decimal, interval, ...)
    pub fn dataset(&self, batch: &RecordBatch) -> Result<Fingerprint> {
        let schema = batch.schema();
        for field in schema.fields() {
            check_supported(field.name(), field.data_type())?;
        }

        let mut columns: Vec<(usize, String, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, f)| (idx, f.name().clone(), f.data_type().to_string()))
            .collect();
        // Column identity is by (name, type); position never matters.
        columns.sort_by(|a, b| (&a.1, &a.2).cmp(&(&b.1, &b.2)));

        let mut hasher = Sha256::new();
        put(&mut hasher, DIGEST_VERSION);
        put(&mut hasher, b"dataset");
        hasher.update([match self.row_order {
            RowOrder::Significant => 0u8,
            RowOrder::Irrelevant => 1u8,
        }]);
        hasher.update((batch.num_rows() as u64).to_le_bytes());
        hasher.update((columns.len() as u64).to_le_bytes());
        for (_, name, data_type) in &columns {
            put(&mut hasher, name.as_bytes());
            put(&mut hasher, data_type.as_bytes());
        }

        match self.row_order {
            RowOrder::Significant => {
                for (idx, _, _) in &columns {
                    let digest = column_digest(batch.column(*idx))?;
                    hasher.update(digest);
                }
            }
            RowOrder::Irrelevant => {
                let mut rows = Vec::with_capacity(batch.num_rows());
                let mut buf = Vec::new();
                for row in 0..batch.num_rows() {
                    let mut row_hasher = Sha256::new();
                    for (idx, _, _) in &columns {
                        buf.clear();
                        encode_cell(batch.column(*idx), row, &mut buf)?;
                        put(&mut row_hasher, &buf);
                    }
                    rows.push(<[u8; 32]>::from(row_hasher.finalize()));
                }
                rows.sort_unstable();
                for row in &rows {
                    hasher.update(row);
                }
            }
        }

        Ok(Fingerprint(hasher.finalize().into()))
    }

    /// Fingerprint a configured transformer, estimator, or composite pipeline.
    ///
    /// Composites hash their named steps in declared order, so reordering steps
    /// changes the fingerprint while renaming a parameter key order does not.
    #[must_use]
    pub fn component(&self, component: &dyn Component) -> Fingerprint {
        let mut hasher = Sha256::new();
        put(&mut hasher, DIGEST_VERSION);
        put(&mut hasher, b"component");
        put(&mut hasher, component.component_type().as_bytes());
        put(&mut hasher, &canonical_json(&component.params()));
        let steps = component.steps();
        hasher.update((steps.len() as u64).to_le_bytes());
        for (name, step) in steps {
            put(&mut hasher, name.as_bytes());
            hasher.update(self.component(step).as_bytes());
        }
        Fingerprint(hasher.finalize().into())
    }

    /// Fingerprint a split request.
    ///
    /// Fractions are rounded to `fraction_precision` decimal digits first, so
    /// `0.7` and `0.70000000001` name the same split.
    #[must_use]
    pub fn split(
        &self,
        dataset: &Fingerprint,
        fractions: &[f64],
        seed: u64,
        stratify_column: Option<&str>,
    ) -> Fingerprint {
        let mut hasher = Sha256::new();
        put(&mut hasher, DIGEST_VERSION);
        put(&mut hasher, b"split");
        hasher.update(dataset.as_bytes());
        hasher.update((fractions.len() as u64).to_le_bytes());
        for fraction in fractions {
            hasher.update(self.round_fraction(*fraction).to_le_bytes());
        }
        hasher.update(seed.to_le_bytes());
        put_optional(&mut hasher, stratify_column);
        Fingerprint(hasher.finalize().into())
    }

    /// Fingerprint one metric evaluation.
    #[must_use]
    pub fn metric(
        &self,
        metric: &dyn Component,
        dataset: &Fingerprint,
        model: &Fingerprint,
        prediction_column: &str,
        label_column: &str,
    ) -> Fingerprint {
        let mut hasher = Sha256::new();
        put(&mut hasher, DIGEST_VERSION);
        put(&mut hasher, b"metric");
        hasher.update(self.component(metric).as_bytes());
        hasher.update(dataset.as_bytes());
        hasher.update(model.as_bytes());
        put(&mut hasher, prediction_column.as_bytes());
        put(&mut hasher, label_column.as_bytes());
        Fingerprint(hasher.finalize().into())
    }

    /// Fraction scaled to an integer at the configured precision
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn round_fraction(&self, fraction: f64) -> i64 {
        let scale = 10f64.powi(self.fraction_precision as i32);
        (fraction * scale).round() as i64
    }
}

/// Length-prefixed write, so adjacent fields can never alias.
fn put(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn put_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            put(hasher, v.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn check_supported(name: &str, data_type: &DataType) -> Result<()> {
    match data_type {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::Date32
        | DataType::Date64
        | DataType::Null => Ok(()),
        other => Err(Error::Fingerprint(format!(
            "column '{name}' has unsupported type {other} for fingerprinting"
        ))),
    }
}

fn column_digest(column: &ArrayRef) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    let mut buf = Vec::new();
    for row in 0..column.len() {
        buf.clear();
        encode_cell(column, row, &mut buf)?;
        put(&mut hasher, &buf);
    }
    Ok(hasher.finalize().into())
}

macro_rules! downcast {
    ($column:expr, $ty:ty) => {
        $column.as_any().downcast_ref::<$ty>().ok_or_else(|| {
            Error::Fingerprint(format!(
                "failed to downcast {} column to {}",
                $column.data_type(),
                stringify!($ty)
            ))
        })?
    };
}

fn canonical_f64(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

fn canonical_f32(value: f32) -> u32 {
    if value.is_nan() {
        f32::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Canonical bytes of one cell: a null tag, then the fixed-width or raw value.
fn encode_cell(column: &ArrayRef, row: usize, out: &mut Vec<u8>) -> Result<()> {
    if column.is_null(row) {
        out.push(0);
        return Ok(());
    }
    out.push(1);

    match column.data_type() {
        DataType::Null => {}
        DataType::Boolean => out.push(u8::from(downcast!(column, BooleanArray).value(row))),
        DataType::Int8 => out.extend_from_slice(&downcast!(column, Int8Array).value(row).to_le_bytes()),
        DataType::Int16 => out.extend_from_slice(&downcast!(column, Int16Array).value(row).to_le_bytes()),
        DataType::Int32 => out.extend_from_slice(&downcast!(column, Int32Array).value(row).to_le_bytes()),
        DataType::Int64 => out.extend_from_slice(&downcast!(column, Int64Array).value(row).to_le_bytes()),
        DataType::UInt8 => out.extend_from_slice(&downcast!(column, UInt8Array).value(row).to_le_bytes()),
        DataType::UInt16 => out.extend_from_slice(&downcast!(column, UInt16Array).value(row).to_le_bytes()),
        DataType::UInt32 => out.extend_from_slice(&downcast!(column, UInt32Array).value(row).to_le_bytes()),
        DataType::UInt64 => out.extend_from_slice(&downcast!(column, UInt64Array).value(row).to_le_bytes()),
        DataType::Float32 => {
            let value = downcast!(column, Float32Array).value(row);
            out.extend_from_slice(&canonical_f32(value).to_le_bytes());
        }
        DataType::Float64 => {
            let value = downcast!(column, Float64Array).value(row);
            out.extend_from_slice(&canonical_f64(value).to_le_bytes());
        }
        DataType::Utf8 => out.extend_from_slice(downcast!(column, StringArray).value(row).as_bytes()),
        DataType::LargeUtf8 => {
            out.extend_from_slice(downcast!(column, LargeStringArray).value(row).as_bytes());
        }
        DataType::Binary => out.extend_from_slice(downcast!(column, BinaryArray).value(row)),
        DataType::LargeBinary => out.extend_from_slice(downcast!(column, LargeBinaryArray).value(row)),
        DataType::Date32 => out.extend_from_slice(&downcast!(column, Date32Array).value(row).to_le_bytes()),
        DataType::Date64 => out.extend_from_slice(&downcast!(column, Date64Array).value(row).to_le_bytes()),
        other => {
            return Err(Error::Fingerprint(format!(
                "unsupported type {other} for fingerprinting"
            )))
        }
    }
    Ok(())
}

/// JSON with object keys sorted at every level, independent of serde_json features.
fn canonical_json(value: &serde_json::Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut Vec<u8>) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(Value::String((*key).clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}
