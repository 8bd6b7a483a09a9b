//! SQLite destination handle.
//!
//! A migration writes through one dedicated connection rather than a pool:
//! the whole load is a single transaction, and `PRAGMA foreign_keys` is a
//! per-connection setting that must stay off until that transaction commits.
//!
//! # Connection Settings
//! - `foreign_keys = OFF` at open, switched on only after COMMIT
//! - rollback journal (`journal_mode = DELETE`) so the result is one file
//! - file created when missing, parent directories created up front

use crate::Result;
use crate::ddl::quote_identifier;
use crate::error::Pg2SqliteError;
use crate::models::VerificationReport;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::path::{Path, PathBuf};

/// Files SQLite may leave next to a database.
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

/// Open connection to the destination database file.
pub struct SqliteDestination {
    path: PathBuf,
    conn: SqliteConnection,
}

impl std::fmt::Debug for SqliteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDestination")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Pg2SqliteError::io(
            format!("Failed to remove existing file {}", path.display()),
            e,
        )),
    }
}

/// Deletes a previous destination and its sidecar files.
///
/// Returns true if a database file was removed. This is not transactional:
/// once it returns, the old database is gone even if the new run fails.
pub async fn remove_existing(path: &Path) -> Result<bool> {
    let removed = remove_if_exists(path).await?;
    for suffix in SIDECAR_SUFFIXES {
        remove_if_exists(&sidecar_path(path, suffix)).await?;
    }
    Ok(removed)
}

impl SqliteDestination {
    /// Replaces any database at `path` with a new empty one and opens it.
    ///
    /// # Errors
    /// Returns an I/O error if old files cannot be removed or the parent
    /// directory cannot be created, and a connection error if SQLite
    /// cannot open the file
    pub async fn create_fresh(path: &Path) -> Result<Self> {
        if remove_existing(path).await? {
            tracing::info!("Replaced existing destination {}", path.display());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Pg2SqliteError::io(
                    format!("Failed to create directory {}", parent.display()),
                    e,
                )
            })?;
        }

        Self::open(path, true).await
    }

    /// Opens an existing destination with foreign-key enforcement off.
    ///
    /// # Errors
    /// Returns a connection error if the file cannot be opened
    pub async fn open(path: &Path, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing)
            .foreign_keys(false)
            .journal_mode(SqliteJournalMode::Delete);

        let conn = SqliteConnection::connect_with(&options).await.map_err(|e| {
            Pg2SqliteError::connection_failed(
                format!("Failed to open SQLite database {}", path.display()),
                e,
            )
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts the single transaction all DDL and data go through.
    ///
    /// # Errors
    /// Returns a connection error if SQLite refuses `BEGIN`
    pub async fn begin(&mut self) -> Result<Transaction<'_, Sqlite>> {
        let path = self.path.display().to_string();
        self.conn.begin().await.map_err(|e| {
            Pg2SqliteError::connection_failed(
                format!("Failed to begin transaction on {}", path),
                e,
            )
        })
    }

    /// Turns on foreign-key enforcement for this connection.
    ///
    /// Has no effect inside an open transaction, so it is called after COMMIT.
    pub async fn enable_foreign_keys(&mut self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut self.conn)
            .await
            .map_err(|e| Pg2SqliteError::verification_failed("Failed to enable foreign keys", e))?;
        Ok(())
    }

    /// User tables in the destination, sorted by name.
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| Pg2SqliteError::verification_failed("Failed to list destination tables", e))
    }

    /// Number of rows in `table`.
    pub async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let statement = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = sqlx::query_scalar(&statement)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| {
                Pg2SqliteError::verification_failed(
                    format!("Failed to count rows in '{}'", table),
                    e,
                )
            })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Number of rows violating a foreign key, per `PRAGMA foreign_key_check`.
    pub async fn foreign_key_violations(&mut self) -> Result<u64> {
        let rows = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| Pg2SqliteError::verification_failed("Foreign key check failed", e))?;
        Ok(rows.len() as u64)
    }

    /// Post-commit snapshot of tables, row counts and foreign-key health.
    ///
    /// A failing foreign key check is recorded in the report so the row
    /// counts already collected are kept.
    ///
    /// # Errors
    /// Returns a verification error if listing or counting fails
    pub async fn verify(&mut self) -> Result<VerificationReport> {
        let mut report = VerificationReport::default();
        for table in self.list_tables().await? {
            let count = self.count_rows(&table).await?;
            report.tables.push((table, count));
        }
        match self.foreign_key_violations().await {
            Ok(violations) => report.foreign_key_violations = violations,
            Err(e) => report.foreign_key_check_error = Some(e.format_detailed()),
        }
        Ok(report)
    }

    /// Closes the connection cleanly.
    pub async fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().await.map_err(|e| {
            Pg2SqliteError::connection_failed(
                format!("Failed to close SQLite database {}", path.display()),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        let path = Path::new("/tmp/out/database.sqlite");
        assert_eq!(
            sidecar_path(path, "-wal"),
            PathBuf::from("/tmp/out/database.sqlite-wal")
        );
    }

    #[tokio::test]
    async fn test_create_fresh_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.sqlite");

        let destination = SqliteDestination::create_fresh(&path).await.unwrap();
        assert_eq!(destination.path(), path.as_path());
        destination.close().await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_create_fresh_replaces_existing_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.sqlite");

        let mut old = SqliteDestination::create_fresh(&path).await.unwrap();
        sqlx::query("CREATE TABLE stale (id INTEGER)")
            .execute(&mut old.conn)
            .await
            .unwrap();
        old.close().await.unwrap();
        std::fs::write(sidecar_path(&path, "-journal"), b"leftover").unwrap();

        let mut fresh = SqliteDestination::create_fresh(&path).await.unwrap();
        assert!(fresh.list_tables().await.unwrap().is_empty());
        assert!(!sidecar_path(&path, "-journal").exists());
    }

    #[tokio::test]
    async fn test_verify_reports_counts_and_violations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.sqlite");
        let mut destination = SqliteDestination::create_fresh(&path).await.unwrap();

        for statement in [
            r#"CREATE TABLE "parent" ("id" INTEGER PRIMARY KEY)"#,
            r#"CREATE TABLE "child" ("id" INTEGER, "parent_id" INTEGER, FOREIGN KEY ("parent_id") REFERENCES "parent"("id"))"#,
            r#"INSERT INTO "parent" VALUES (1)"#,
            r#"INSERT INTO "child" VALUES (1, 1), (2, 99)"#,
        ] {
            sqlx::query(statement)
                .execute(&mut destination.conn)
                .await
                .unwrap();
        }
        destination.enable_foreign_keys().await.unwrap();

        let report = destination.verify().await.unwrap();
        assert_eq!(
            report.tables,
            vec![("child".to_string(), 2), ("parent".to_string(), 1)]
        );
        assert_eq!(report.foreign_key_violations, 1);
        assert_eq!(report.foreign_key_check_error, None);
    }

    #[tokio::test]
    async fn test_verify_keeps_counts_when_foreign_key_check_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.sqlite");
        let mut destination = SqliteDestination::create_fresh(&path).await.unwrap();

        // Parent column is not unique, so the check reports a mismatch
        for statement in [
            r#"CREATE TABLE "customers" ("id" INTEGER)"#,
            r#"CREATE TABLE "tickets" ("customer_id" INTEGER, FOREIGN KEY ("customer_id") REFERENCES "customers"("id"))"#,
            r#"INSERT INTO "customers" VALUES (1)"#,
            r#"INSERT INTO "tickets" VALUES (1), (1)"#,
        ] {
            sqlx::query(statement)
                .execute(&mut destination.conn)
                .await
                .unwrap();
        }
        destination.enable_foreign_keys().await.unwrap();

        let report = destination.verify().await.unwrap();
        assert_eq!(
            report.tables,
            vec![("customers".to_string(), 1), ("tickets".to_string(), 2)]
        );
        assert!(
            report
                .foreign_key_check_error
                .as_deref()
                .is_some_and(|e| e.contains("mismatch"))
        );
    }
}
