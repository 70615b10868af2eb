//! Local cache of node identities already acknowledged by a store
//!
//! Stored as a three-column Parquet file (`store`, `kind`, `fingerprint`, all
//! Utf8). Entries only count for the store identity that acknowledged them.
//! The cache only saves upload volume across process restarts; every failure
//! to read or write it is logged and otherwise ignored.

use crate::fingerprint::Fingerprint;
use crate::lineage::{NodeKind, NodeRef};
use crate::{Error, Result};
use arrow::array::{Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Node identities known to be stored, per store.
#[derive(Debug, Default)]
pub struct SyncedCache {
    path: Option<PathBuf>,
    synced: FxHashMap<String, FxHashSet<NodeRef>>,
}

impl SyncedCache {
    /// Cache that lives only as long as the process
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by `path`, loaded now.
    ///
    /// A missing or unreadable file yields an empty cache.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let synced = if path.exists() {
            match Self::load(&path) {
                Ok(synced) => {
                    debug!(path = %path.display(), stores = synced.len(), "synced cache loaded");
                    synced
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable synced cache");
                    FxHashMap::default()
                }
            }
        } else {
            FxHashMap::default()
        };
        Self {
            path: Some(path),
            synced,
        }
    }

    /// Read every entry of a cache file, grouped by store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be opened or parsed, or holds
    /// an unknown kind or a malformed fingerprint
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FxHashMap<String, FxHashSet<NodeRef>>> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open cache file: {e}")))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse cache file: {e}")))?
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create cache reader: {e}")))?;

        let mut synced: FxHashMap<String, FxHashSet<NodeRef>> = FxHashMap::default();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read cache batch: {e}")))?;
            let stores = string_column(&batch, "store")?;
            let kinds = string_column(&batch, "kind")?;
            let fingerprints = string_column(&batch, "fingerprint")?;
            for row in 0..batch.num_rows() {
                let kind: NodeKind = kinds
                    .value(row)
                    .parse()
                    .map_err(|e| Error::StorageError(format!("cache row {row}: {e}")))?;
                let fingerprint = Fingerprint::from_hex(fingerprints.value(row))
                    .map_err(|e| Error::StorageError(format!("cache row {row}: {e}")))?;
                synced
                    .entry(stores.value(row).to_string())
                    .or_default()
                    .insert(NodeRef::new(kind, fingerprint));
            }
        }
        Ok(synced)
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `store` is known to hold `node_ref`
    #[must_use]
    pub fn contains(&self, store: &str, node_ref: &NodeRef) -> bool {
        self.synced
            .get(store)
            .is_some_and(|refs| refs.contains(node_ref))
    }

    /// Number of entries across all stores
    #[must_use]
    pub fn len(&self) -> usize {
        self.synced.values().map(FxHashSet::len).sum()
    }

    /// True when nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record nodes acknowledged by `store`; returns how many were new.
    pub fn extend(&mut self, store: &str, refs: impl IntoIterator<Item = NodeRef>) -> usize {
        let known = self.synced.entry(store.to_string()).or_default();
        let before = known.len();
        known.extend(refs);
        known.len() - before
    }

    /// Drop entries `store` turned out not to hold; returns how many were removed.
    pub fn forget<'a>(&mut self, store: &str, refs: impl IntoIterator<Item = &'a NodeRef>) -> usize {
        let Some(known) = self.synced.get_mut(store) else {
            return 0;
        };
        refs.into_iter().filter(|r| known.remove(*r)).count()
    }

    /// Write the cache to its file (sorted, via a temporary file and rename).
    ///
    /// # Errors
    ///
    /// Returns `Io`, `Arrow` or `Parquet` errors from writing the file
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut entries: Vec<(&str, &NodeRef)> = self
            .synced
            .iter()
            .flat_map(|(store, refs)| refs.iter().map(move |r| (store.as_str(), r)))
            .collect();
        entries.sort();
        let stores = StringArray::from_iter_values(entries.iter().map(|(store, _)| *store));
        let kinds = StringArray::from_iter_values(entries.iter().map(|(_, r)| r.kind.as_str()));
        let fingerprints =
            StringArray::from_iter_values(entries.iter().map(|(_, r)| r.fingerprint.to_hex()));

        let schema = Arc::new(Schema::new(vec![
            Field::new("store", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("fingerprint", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(stores), Arc::new(kinds), Arc::new(fingerprints)],
        )?;

        let tmp = path.with_extension("parquet.tmp");
        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = entries.len(), "synced cache written");
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::StorageError(format!("cache file has no Utf8 column '{name}'")))
}
