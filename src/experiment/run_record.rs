//! Run Record - one execution instance of an experiment

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a run: `Created -> Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed, nothing tracked yet.
    Created,
    /// Accepting tracked operations.
    Open,
    /// Sealed; tracked operations are rejected.
    Closed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Run Record represents a single execution of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    description: Option<String>,
    state: RunState,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new run record in `Created` state with a fresh random id.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - ID of the parent experiment
    #[must_use]
    pub fn new(experiment_id: impl Into<String>) -> Self {
        Self::builder(experiment_id).build()
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(experiment_id: impl Into<String>) -> RunRecordBuilder {
        RunRecordBuilder::new(experiment_id)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the timestamp the run opened, if it has.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the timestamp the run closed, if it has.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Move `Created -> Open`, setting `started_at`.
    ///
    /// Returns `true` if the state changed; opening an open run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the run is closed
    pub fn open(&mut self) -> Result<bool> {
        match self.state {
            RunState::Created => {
                self.state = RunState::Open;
                self.started_at = Some(Utc::now());
                Ok(true)
            }
            RunState::Open => Ok(false),
            RunState::Closed => Err(self.closed_error()),
        }
    }

    /// Move to `Closed`, setting `ended_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the run is already closed
    pub fn close(&mut self) -> Result<()> {
        if self.state == RunState::Closed {
            return Err(self.closed_error());
        }
        self.state = RunState::Closed;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Error for an operation attempted on a closed run
    #[must_use]
    pub fn closed_error(&self) -> Error {
        Error::InvalidState(format!("run {} is closed", self.run_id))
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    run_id: String,
    experiment_id: String,
    description: Option<String>,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            experiment_id: experiment_id.into(),
            description: None,
        }
    }

    /// Use a known run ID instead of a random one.
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            experiment_id: self.experiment_id,
            description: self.description,
            state: RunState::Created,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}
