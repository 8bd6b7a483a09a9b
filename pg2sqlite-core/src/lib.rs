//! Core engine for pg2sqlite.
//!
//! This crate introspects a PostgreSQL schema, recreates it in a fresh SQLite
//! file and copies every row inside a single destination transaction. Either
//! the whole schema and all data land, or the destination is left empty.
//!
//! # Guarantees
//! - The source is only read: sessions run with read-only transactions
//! - Destination DDL and data share one transaction; any failure rolls back
//! - Foreign keys are checked after COMMIT, never during the load
//! - Connection strings are redacted in every log line and error
//!
//! # Architecture
//! - [`adapters`]: the [`SourceAdapter`] seam, PostgreSQL source and SQLite destination
//! - [`type_mapping`]: PostgreSQL type names to SQLite storage classes
//! - [`ddl`]: `CREATE TABLE` / `CREATE INDEX` generation
//! - [`copier`]: batched row transfer
//! - [`orchestrator`]: the migration state machine

pub mod adapters;
pub mod copier;
pub mod ddl;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod security;
pub mod type_mapping;

// Re-export commonly used types
pub use adapters::{ConnectionConfig, MigrationConfig, SourceAdapter};
pub use error::{ErrorKind, Pg2SqliteError, Result};
pub use models::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, IndexLimitation, MigrationPhase,
    MigrationResult, MigrationStatus, ReferentialAction, Row, RunError, StorageClass,
    TableDescriptor, TableReport, Value, VerificationReport,
};
pub use orchestrator::Orchestrator;

#[cfg(feature = "postgresql")]
pub use adapters::postgres::PostgresSource;
