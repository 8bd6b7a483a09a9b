//! Source pool settings.
//!
//! Everything here ends up in the pool options or in the `SET` statements
//! run on each new session. Host, database and credentials stay in the
//! connection URL.

use crate::error::Pg2SqliteError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on pooled source connections.
pub const MAX_POOL_CONNECTIONS: u32 = 100;

/// Pool and session limits for the source database.
///
/// # Example
/// ```rust
/// use pg2sqlite_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new()
///     .with_max_connections(4)
///     .with_query_timeout(Duration::from_secs(600));
///
/// assert!(config.validate().is_ok());
/// assert!(config.read_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Pool acquire timeout
    pub connect_timeout: Duration,
    /// Server-side `statement_timeout`
    pub query_timeout: Duration,
    /// Server-side `lock_timeout`
    pub lock_timeout: Duration,
    pub max_connections: u32,
    /// Sessions default to read-only transactions
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            // Full-table streaming reads can run long on big tables
            query_timeout: Duration::from_secs(3600),
            lock_timeout: Duration::from_secs(30),
            max_connections: 2,
            read_only: true,
        }
    }
}

impl ConnectionConfig {
    /// Creates a config with the read-only defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the pool acquire timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Validates the limits.
    ///
    /// # Errors
    /// Returns a configuration error for a zero timeout or an out-of-range pool size
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 || self.max_connections > MAX_POOL_CONNECTIONS {
            return Err(Pg2SqliteError::configuration(format!(
                "max_connections must be between 1 and {}",
                MAX_POOL_CONNECTIONS
            )));
        }

        for (name, timeout) in [
            ("connect_timeout", self.connect_timeout),
            ("query_timeout", self.query_timeout),
            ("lock_timeout", self.lock_timeout),
        ] {
            if timeout.is_zero() {
                return Err(Pg2SqliteError::configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}
