//! SQLite destination.
//!
//! # Module Structure
//! - `destination`: File reset, single-connection transaction and post-commit checks
//!
//! # SQLite-Specific Behavior
//! - Uses `sqlite_master` and `PRAGMA foreign_key_check` for verification
//! - DDL is transactional, so a rollback leaves no tables behind

mod destination;

pub use destination::{SqliteDestination, remove_existing};
