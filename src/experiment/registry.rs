//! Experiment Registry - in-memory directory of projects, experiments, and runs
//!
//! Projects are keyed by name and experiments by (project, name), so naming an
//! existing one returns it unchanged ("new or existing" semantics).

use std::collections::HashMap;

use super::{ExperimentRecord, ExperimentSpec, ProjectRecord, ProjectSpec, RunRecord};
use tracing::info;

/// In-memory registry of tracking records.
///
/// ## Design
///
/// Hash maps give O(1) lookup by ID; secondary name indexes implement
/// get-or-create. Runs remember insertion order so listings are stable.
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    projects: HashMap<String, ProjectRecord>,
    project_names: HashMap<String, String>,
    experiments: HashMap<String, ExperimentRecord>,
    experiment_names: HashMap<(String, String), String>,
    runs: HashMap<String, RunRecord>,
    run_order: Vec<String>,
}

impl ExperimentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.experiments.is_empty() && self.runs.is_empty()
    }

    /// Get the number of projects.
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Get the number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Return the project named `spec.name`, creating it if absent.
    ///
    /// An existing project keeps the author and description it was created with.
    pub fn project_or_create(&mut self, spec: &ProjectSpec) -> ProjectRecord {
        if let Some(project) = self
            .project_names
            .get(&spec.name)
            .and_then(|id| self.projects.get(id))
        {
            return project.clone();
        }
        let project = ProjectRecord::new(&spec.name, &spec.author, &spec.description);
        info!(project = %project.name(), id = %project.project_id(), "project created");
        self.project_names
            .insert(spec.name.clone(), project.project_id().to_string());
        self.projects
            .insert(project.project_id().to_string(), project.clone());
        project
    }

    /// Return the experiment `spec` names within `project_id`, creating it if absent.
    pub fn experiment_or_create(&mut self, project_id: &str, spec: &ExperimentSpec) -> ExperimentRecord {
        let key = (project_id.to_string(), spec.name().to_string());
        if let Some(experiment) = self
            .experiment_names
            .get(&key)
            .and_then(|id| self.experiments.get(id))
        {
            return experiment.clone();
        }
        let experiment = ExperimentRecord::new(project_id, spec.name());
        info!(experiment = %experiment.name(), id = %experiment.experiment_id(), "experiment created");
        self.experiment_names
            .insert(key, experiment.experiment_id().to_string());
        self.experiments
            .insert(experiment.experiment_id().to_string(), experiment.clone());
        experiment
    }

    /// Get a project by ID.
    #[must_use]
    pub fn get_project(&self, project_id: &str) -> Option<&ProjectRecord> {
        self.projects.get(project_id)
    }

    /// Get a project by name.
    #[must_use]
    pub fn find_project(&self, name: &str) -> Option<&ProjectRecord> {
        self.project_names
            .get(name)
            .and_then(|id| self.projects.get(id))
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: &str) -> Option<&ExperimentRecord> {
        self.experiments.get(experiment_id)
    }

    /// Add a run to the registry.
    pub fn add_run(&mut self, run: RunRecord) {
        let run_id = run.run_id().to_string();
        if self.runs.insert(run_id.clone(), run).is_none() {
            self.run_order.push(run_id);
        }
    }

    /// Replace the stored copy of a run (state changes). Unknown runs are added.
    pub fn update_run(&mut self, run: RunRecord) {
        self.add_run(run);
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get all runs for an experiment, in creation order.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: &str) -> Vec<&RunRecord> {
        self.run_order
            .iter()
            .filter_map(|id| self.runs.get(id))
            .filter(|run| run.experiment_id() == experiment_id)
            .collect()
    }
}
