//! PostgreSQL source adapter: catalog introspection and row streaming.
//!
//! # Module Structure
//! - `connection`: Pool creation, URL parsing and validation
//! - `introspection`: Tables, columns, keys and indexes from the catalogs
//! - `rows`: SELECT projection and typed row decoding
//!
//! # Security Guarantees
//! - Sessions default to read-only transactions
//! - Connection strings are sanitized in error messages
//! - `statement_timeout` bounds every query

mod connection;
mod introspection;
mod rows;


use super::{ConnectionConfig, SourceAdapter};
use crate::{
    Result,
    error::Pg2SqliteError,
    models::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, Row, TableDescriptor},
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use sqlx::PgPool;

pub use introspection::map_referential_action;
pub use rows::{Projection, build_select};

/// PostgreSQL source with a lazily-connecting, read-only pool.
pub struct PostgresSource {
    pool: PgPool,
    config: ConnectionConfig,
    schema: String,
    /// Connection URL with the password masked
    redacted_url: String,
}

impl std::fmt::Debug for PostgresSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSource")
            .field("url", &self.redacted_url)
            .field("schema", &self.schema)
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresSource {
    /// Connection settings parsed from the URL (no credentials).
    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn test_connection(&self) -> Result<()> {
        let connectivity_result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Pg2SqliteError::connection_failed(
                    format!("Cannot reach PostgreSQL at {}", self.redacted_url),
                    e,
                )
            })?;

        if connectivity_result != 1 {
            return Err(Pg2SqliteError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        introspection::list_tables(&self.pool, &self.schema).await
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        introspection::describe_columns(&self.pool, &self.schema, table).await
    }

    async fn describe_primary_key(&self, table: &str) -> Result<Vec<String>> {
        introspection::describe_primary_key(&self.pool, &self.schema, table).await
    }

    async fn describe_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        introspection::describe_foreign_keys(&self.pool, &self.schema, table).await
    }

    async fn describe_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        introspection::describe_indexes(&self.pool, &self.schema, table).await
    }

    fn select_statement(&self, table: &TableDescriptor) -> String {
        build_select(&self.schema, table)
    }

    fn stream_rows<'a>(
        &'a self,
        table: &'a TableDescriptor,
        statement: &'a str,
    ) -> BoxStream<'a, Result<Row>> {
        rows::stream_rows(&self.pool, table, statement)
    }
}
