//! # Trueno-Lineage: Provenance Tracking for ML Pipelines
//!
//! **Version**: 0.1.0
//!
//! Trueno-Lineage wraps the operations of a machine-learning pipeline (column
//! encoding, fit/transform, random splits, pipeline fits, metric computation)
//! so that each call is recorded in a content-addressed lineage graph, and
//! pushes the graph incrementally to a remote metadata store.
//!
//! ## Design Principles
//!
//! - **Content addressing**: artifacts are identified by SHA-256 fingerprints,
//!   so identical frames and configurations collapse to one node
//! - **Transparency**: a wrapped call returns exactly what the library returned,
//!   and its failures reach the caller untouched
//! - **Transactional recording**: a call's nodes and edges land together or not at all
//! - **At-least-once sync**: the synced checkpoint moves only on acknowledgement
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_lineage::config::TrackingConfig;
//! use trueno_lineage::experiment::{ExperimentSpec, ProjectSpec};
//! use trueno_lineage::run::Tracker;
//! use trueno_lineage::sync::MemoryMetadataStore;
//! # use arrow::record_batch::RecordBatch;
//! # async fn example(frame: RecordBatch) -> trueno_lineage::Result<()> {
//!
//! let tracker = Tracker::new(MemoryMetadataStore::new(), TrackingConfig::default())?;
//! let run = tracker.start_run(&ProjectSpec::new("census"), &ExperimentSpec::Default, None);
//!
//! let parts = run.random_split(&frame, &[0.7, 0.3], 0)?;
//! println!("train rows: {}", parts[0].num_rows());
//!
//! tracker.close_run(&run)?;
//! let report = tracker.sync(&run).await?;
//! println!("uploaded {} nodes", report.nodes_sent);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod fingerprint;
pub mod lineage;
pub mod ops;
pub mod run;
pub mod split;
pub mod sync;
pub mod telemetry;

pub use config::{SyncConfig, TrackingConfig};
pub use error::{Error, Result, TrackedError};
pub use fingerprint::{Fingerprint, Fingerprinter, RowOrder};
pub use run::{RunContext, SyncReport, Tracker};
