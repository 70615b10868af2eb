//! Project Record - named container referenced by every run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Project Record represents a named container for experiments.
///
/// Created once and immutable afterwards; every run references it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRecord {
    project_id: String,
    name: String,
    author: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// Create a project with a fresh random id.
    ///
    /// # Arguments
    ///
    /// * `name` - Project name, unique within a registry
    /// * `author` - Who created it
    /// * `description` - Free-form description
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project_id: Uuid::new_v4().to_string(),
            name: name.into(),
            author: author.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Get the project ID.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get the project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the author.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// What a run asks for when it names its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    /// Project name
    pub name: String,
    /// Author, used only if the project is created
    pub author: String,
    /// Description, used only if the project is created
    pub description: String,
}

impl ProjectSpec {
    /// Project called `name` with empty author and description
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            description: String::new(),
        }
    }

    /// Set the author
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
