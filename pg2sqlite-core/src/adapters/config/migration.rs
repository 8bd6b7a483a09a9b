//! Migration run configuration.
//!
//! Passed explicitly into the orchestrator; nothing here is read from
//! globals or the environment.

use crate::error::Pg2SqliteError;
use serde::{Deserialize, Serialize};

/// Default number of rows per INSERT batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Configuration for one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source schema whose base tables are migrated
    pub source_schema: String,
    /// Rows per multi-row INSERT (capped by SQLite's bound-parameter limit)
    pub batch_size: usize,
    /// Emit `CREATE ... IF NOT EXISTS`
    pub if_not_exists: bool,
    /// Run the post-commit verification pass
    pub verify: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_schema: "public".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            if_not_exists: false,
            verify: true,
        }
    }
}

impl MigrationConfig {
    /// Creates a new migration config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the source schema.
    pub fn with_source_schema(mut self, schema: impl Into<String>) -> Self {
        self.source_schema = schema.into();
        self
    }

    /// Builder method to set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to toggle `IF NOT EXISTS` DDL.
    pub fn with_if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Builder method to toggle post-commit verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if the batch size is zero or the schema name is empty
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(Pg2SqliteError::configuration(
                "batch_size must be greater than 0",
            ));
        }

        if self.source_schema.trim().is_empty() {
            return Err(Pg2SqliteError::configuration(
                "source_schema cannot be empty",
            ));
        }

        Ok(())
    }
}
