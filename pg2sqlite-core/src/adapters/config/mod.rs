//! Configuration types for a migration run.
//!
//! - `ConnectionConfig`: Source pool and session limits
//! - `MigrationConfig`: Schema, batching and DDL options
//!
//! # Security
//! These configuration structs intentionally do NOT store passwords or credentials.

mod connection;
mod migration;

pub use connection::{ConnectionConfig, MAX_POOL_CONNECTIONS};
pub use migration::{DEFAULT_BATCH_SIZE, MigrationConfig};
