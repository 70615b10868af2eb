//! Tracker: registry of projects/experiments/runs plus the sync client

use super::context::{RunContext, SyncReport};
use crate::config::TrackingConfig;
use crate::experiment::{ExperimentRegistry, ExperimentSpec, ProjectSpec, RunRecord};
use crate::sync::{MetadataStore, SyncClient};
use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use tracing::info;

/// Entry point for tracked runs against one metadata store.
///
/// # Example
///
/// ```rust
/// use trueno_lineage::config::TrackingConfig;
/// use trueno_lineage::experiment::{ExperimentSpec, ProjectSpec, RunState};
/// use trueno_lineage::run::Tracker;
/// use trueno_lineage::sync::MemoryMetadataStore;
///
/// let tracker = Tracker::new(MemoryMetadataStore::new(), TrackingConfig::default()).unwrap();
/// let run = tracker.start_run(
///     &ProjectSpec::new("census").author("ana"),
///     &ExperimentSpec::Default,
///     Some("baseline"),
/// );
/// assert_eq!(run.state(), RunState::Created);
/// assert_eq!(run.experiment().name(), "Default Experiment");
/// ```
#[derive(Debug)]
pub struct Tracker<S> {
    client: SyncClient<S>,
    registry: Mutex<ExperimentRegistry>,
    config: TrackingConfig,
}

impl<S: MetadataStore> Tracker<S> {
    /// Tracker uploading to `store`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `config` does not validate
    pub fn new(store: S, config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: SyncClient::new(store, config.sync.clone()),
            registry: Mutex::new(ExperimentRegistry::new()),
            config,
        })
    }

    /// Settings new runs are created with
    pub const fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Sync client (and through it, the store)
    pub const fn client(&self) -> &SyncClient<S> {
        &self.client
    }

    /// Locked view of the registry
    pub fn registry(&self) -> MutexGuard<'_, ExperimentRegistry> {
        self.registry.lock()
    }

    /// Create a run in `Created` state, creating the project and experiment
    /// records if absent.
    pub fn start_run(
        &self,
        project: &ProjectSpec,
        experiment: &ExperimentSpec,
        description: Option<&str>,
    ) -> RunContext {
        let mut registry = self.registry.lock();
        let project = registry.project_or_create(project);
        let experiment = registry.experiment_or_create(project.project_id(), experiment);

        let mut builder = RunRecord::builder(experiment.experiment_id());
        if let Some(description) = description {
            builder = builder.description(description);
        }
        let record = builder.build();
        registry.add_run(record.clone());
        info!(
            run_id = %record.run_id(),
            project = %project.name(),
            experiment = %experiment.name(),
            "run created"
        );

        RunContext::new(project, experiment, record, self.config.clone())
    }

    /// Upload the run's unsent delta and refresh its registry record.
    ///
    /// # Errors
    ///
    /// Returns `Sync` when retries are exhausted or the store rejects the batch
    pub async fn sync(&self, run: &RunContext) -> Result<SyncReport> {
        let report = run.sync(&self.client).await?;
        self.registry.lock().update_run(run.record());
        Ok(report)
    }

    /// Close the run and refresh its registry record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the run is already closed
    pub fn close_run(&self, run: &RunContext) -> Result<()> {
        run.close()?;
        self.registry.lock().update_run(run.record());
        Ok(())
    }
}
