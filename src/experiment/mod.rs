//! Experiment Tracking Records
//!
//! Projects, experiments, and runs that lineage graphs hang off.
//!
//! ## Schema Overview
//!
//! ```text
//! ProjectRecord (1) ──< ExperimentRecord (N) ──< RunRecord (N)
//!                                                   │
//!                                                   └── LineageGraph (1, owned by the run)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_lineage::experiment::{ExperimentRegistry, ExperimentSpec, ProjectSpec, RunRecord, RunState};
//!
//! let mut registry = ExperimentRegistry::new();
//! let project = registry.project_or_create(&ProjectSpec::new("census").author("ana"));
//! let experiment = registry.experiment_or_create(project.project_id(), &ExperimentSpec::Default);
//!
//! let mut run = RunRecord::new(experiment.experiment_id());
//! run.open().unwrap();
//! assert_eq!(run.state(), RunState::Open);
//! ```

mod experiment_record;
mod project_record;
mod registry;
mod run_record;

pub use experiment_record::{
    ExperimentRecord, ExperimentRecordBuilder, ExperimentSpec, DEFAULT_EXPERIMENT_NAME,
};
pub use project_record::{ProjectRecord, ProjectSpec};
pub use registry::ExperimentRegistry;
pub use run_record::{RunRecord, RunRecordBuilder, RunState};
