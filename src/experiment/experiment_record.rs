//! Experiment Record - logical grouping of runs within a project

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the experiment used when a run does not name one.
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default Experiment";

/// Experiment Record groups runs within a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    project_id: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// Create a new experiment record with a fresh random id.
    ///
    /// # Arguments
    ///
    /// * `project_id` - ID of the owning project
    /// * `name` - Human-readable name, unique within the project
    #[must_use]
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::builder(project_id, name).build()
    }

    /// Create a builder for constructing an experiment record with optional fields.
    #[must_use]
    pub fn builder(project_id: impl Into<String>, name: impl Into<String>) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(project_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the owning project ID.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    experiment_id: String,
    project_id: String,
    name: String,
    description: Option<String>,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// Use a known experiment ID instead of a random one.
    #[must_use]
    pub fn experiment_id(mut self, experiment_id: impl Into<String>) -> Self {
        self.experiment_id = experiment_id.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: self.experiment_id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

/// Which experiment a run belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExperimentSpec {
    /// The project's `"Default Experiment"`, created on first use
    #[default]
    Default,
    /// A named experiment, created on first use
    Named(String),
}

impl ExperimentSpec {
    /// Experiment name this spec resolves to
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Default => DEFAULT_EXPERIMENT_NAME,
            Self::Named(name) => name,
        }
    }
}

impl From<&str> for ExperimentSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}
