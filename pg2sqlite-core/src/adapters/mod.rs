//! Source adapter trait and the concrete source/destination adapters.
//!
//! The orchestrator only talks to the source through [`SourceAdapter`], so
//! the PostgreSQL implementation can be swapped for an in-memory one in
//! tests. The SQLite destination is always compiled in.
//!
//! # Module Structure
//! - `config`: Configuration types (ConnectionConfig, MigrationConfig)
//! - `helpers`: Shared row-decoding helpers
//! - `postgres`: PostgreSQL schema introspection and row streaming
//! - `sqlite`: SQLite destination handle

use crate::{
    Result,
    error::Pg2SqliteError,
    models::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, Row, TableDescriptor},
};
use async_trait::async_trait;
use futures::stream::BoxStream;

// Configuration module
pub mod config;

#[cfg(feature = "postgresql")]
pub mod helpers;

#[cfg(feature = "postgresql")]
pub mod postgres;

pub mod sqlite;

// Re-export configuration types for convenience
pub use config::{ConnectionConfig, DEFAULT_BATCH_SIZE, MigrationConfig};
pub use crate::error::redact_database_url;

/// Read-only view of a relational source schema and its rows.
///
/// # Security Guarantees
/// - All operations are read-only
/// - Credentials are never stored or logged
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn SourceAdapter>`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Schema whose tables this source lists and reads.
    fn schema(&self) -> &str;

    /// Checks that the source is reachable.
    ///
    /// # Errors
    /// Returns a connection error if the source cannot be reached
    async fn test_connection(&self) -> Result<()>;

    /// Lists base tables of the configured schema in lexicographic order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` ordered by ordinal position.
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Primary-key columns of `table` in key order; empty when there is none.
    async fn describe_primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Foreign keys declared on `table`.
    ///
    /// `referenced_schema` is `None` when the referenced table lives in the
    /// schema being migrated.
    async fn describe_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>>;

    /// Secondary indexes of `table`, excluding the primary-key index.
    ///
    /// Indexes SQLite cannot reproduce are returned with
    /// [`IndexDescriptor::unsupported`] set.
    async fn describe_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>>;

    /// Builds the full descriptor for `table`.
    ///
    /// # Errors
    /// Returns an introspection error if any catalog lookup fails or the
    /// table has no columns
    async fn describe_table(&self, table: &str) -> Result<TableDescriptor> {
        let columns = self.describe_columns(table).await?;
        if columns.is_empty() {
            return Err(Pg2SqliteError::unsupported_table(
                table,
                format!("Table '{}' has no columns", table),
            ));
        }

        Ok(TableDescriptor {
            name: table.to_string(),
            columns,
            primary_key: self.describe_primary_key(table).await?,
            foreign_keys: self.describe_foreign_keys(table).await?,
            indexes: self.describe_indexes(table).await?,
        })
    }

    /// Statement that reads every row of `table` in descriptor column order.
    ///
    /// The caller owns the returned string for as long as the stream from
    /// [`SourceAdapter::stream_rows`] is alive.
    fn select_statement(&self, table: &TableDescriptor) -> String;

    /// Streams the rows produced by `statement`, one [`Row`] per item.
    ///
    /// Rows are yielded as they arrive; the adapter never buffers the whole
    /// table.
    fn stream_rows<'a>(
        &'a self,
        table: &'a TableDescriptor,
        statement: &'a str,
    ) -> BoxStream<'a, Result<Row>>;
}
