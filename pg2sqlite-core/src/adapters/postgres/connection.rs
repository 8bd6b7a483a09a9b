//! PostgreSQL connection pool management and validation.
//!
//! # Security Features
//! - Validates connection string format and parameters
//! - Enforces connection limits to prevent resource exhaustion
//! - Sets appropriate timeouts for all operations
//! - Forces read-only transactions on every pooled session

use super::{ConnectionConfig, PostgresSource};
use crate::adapters::config::MAX_POOL_CONNECTIONS;
use crate::Result;
use crate::error::{Pg2SqliteError, redact_database_url};
use sqlx::PgPool;
use std::time::Duration;
use url::Url;

/// Longest identifier PostgreSQL accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

impl PostgresSource {
    /// Creates a PostgreSQL source for `schema` with settings parsed from the URL.
    ///
    /// The pool connects lazily; call [`crate::SourceAdapter::test_connection`]
    /// to surface connection problems.
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection URL (credentials sanitized in errors)
    /// * `schema` - Source schema to migrate
    ///
    /// # Errors
    /// Returns error if the connection string is malformed or the pool cannot be built
    pub async fn new(connection_string: &str, schema: impl Into<String>) -> Result<Self> {
        let config = Self::parse_connection_config(connection_string)?;
        Self::with_config(connection_string, config, schema).await
    }

    /// Creates a PostgreSQL source with custom configuration.
    ///
    /// # Errors
    /// Returns error if the configuration or connection string is invalid
    pub async fn with_config(
        connection_string: &str,
        config: ConnectionConfig,
        schema: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let schema = schema.into();
        if schema.trim().is_empty() {
            return Err(Pg2SqliteError::configuration("source schema cannot be empty"));
        }

        let pool = Self::create_connection_pool(connection_string, &config).await?;

        Ok(Self {
            pool,
            config,
            schema,
            redacted_url: redact_database_url(connection_string),
        })
    }

    /// Parses connection string to extract configuration parameters
    ///
    /// Recognized query parameters: `connect_timeout` (seconds),
    /// `statement_timeout` (milliseconds) and `pool_max_conns`.
    ///
    /// # Errors
    /// Returns error if connection string is malformed or contains unsafe parameters
    pub fn parse_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
        let url = Self::validate_connection_string(connection_string)?;

        let mut config = ConnectionConfig::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "connect_timeout" => {
                    if let Ok(timeout_secs) = value.parse::<u64>()
                        && timeout_secs > 0
                        && timeout_secs <= 300
                    {
                        config.connect_timeout = Duration::from_secs(timeout_secs);
                    }
                }
                "statement_timeout" => {
                    if let Ok(timeout_ms) = value.parse::<u64>()
                        && timeout_ms > 0
                    {
                        config.query_timeout = Duration::from_millis(timeout_ms);
                    }
                }
                "pool_max_conns" => {
                    if let Ok(max_conns) = value.parse::<u32>()
                        && max_conns > 0
                        && max_conns <= MAX_POOL_CONNECTIONS
                    {
                        config.max_connections = max_conns;
                    }
                }
                _ => {}
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Validates connection string format and returns the parsed URL.
    ///
    /// # Errors
    /// Returns error if the scheme is not PostgreSQL, the host is missing, or
    /// the database or user name exceeds PostgreSQL's identifier length
    pub fn validate_connection_string(connection_string: &str) -> Result<Url> {
        let url = Url::parse(connection_string).map_err(|e| {
            Pg2SqliteError::configuration(format!(
                "Invalid PostgreSQL connection string format: {}",
                e
            ))
        })?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(Pg2SqliteError::configuration(
                "Connection string must use postgres:// or postgresql:// scheme",
            ));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Pg2SqliteError::configuration(
                "Connection string must specify a host",
            ));
        }

        if url.path().trim_start_matches('/').len() > MAX_IDENTIFIER_LEN {
            return Err(Pg2SqliteError::configuration(
                "Database name too long: maximum 63 characters",
            ));
        }

        if url.username().len() > MAX_IDENTIFIER_LEN {
            return Err(Pg2SqliteError::configuration(
                "Username too long: maximum 63 characters",
            ));
        }

        Ok(url)
    }

    /// Creates a connection pool with session settings applied to every connection.
    ///
    /// - `statement_timeout` and `lock_timeout` from the configuration
    /// - read-only transactions when `read_only` is set
    /// - UTC timezone and ISO date style so text casts are ISO-8601
    /// - `application_name` for connection tracking
    pub(crate) async fn create_connection_pool(
        connection_string: &str,
        config: &ConnectionConfig,
    ) -> Result<PgPool> {
        use sqlx::Executor;

        Self::validate_connection_string(connection_string)?;

        let query_timeout_ms = config.query_timeout.as_millis();
        let lock_timeout_ms = config.lock_timeout.as_millis();
        let read_only = config.read_only;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections.min(MAX_POOL_CONNECTIONS))
            .min_connections(0)
            .acquire_timeout(config.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(
                        format!("SET statement_timeout = {}", query_timeout_ms).as_str(),
                    )
                    .await?;

                    conn.execute(format!("SET lock_timeout = {}", lock_timeout_ms).as_str())
                        .await?;

                    let app_name = format!("pg2sqlite-{}", env!("CARGO_PKG_VERSION"));
                    conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                        .await?;

                    if read_only {
                        conn.execute("SET default_transaction_read_only = on")
                            .await?;
                    }

                    conn.execute("SET timezone = 'UTC'").await?;
                    conn.execute("SET datestyle = 'ISO'").await?;

                    Ok(())
                })
            })
            .connect_lazy(connection_string)
            .map_err(|e| {
                Pg2SqliteError::connection_failed(
                    format!(
                        "Failed to create PostgreSQL connection pool to {}",
                        redact_database_url(connection_string)
                    ),
                    e,
                )
            })?;

        Ok(pool)
    }
}
