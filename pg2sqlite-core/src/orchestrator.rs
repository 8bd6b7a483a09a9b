//! Migration state machine.
//!
//! ```text
//! INIT -> SCHEMA_LIST -> { DESCRIBE -> CREATE_TABLE -> COPY_DATA -> CREATE_INDEXES }*
//!      -> COMMIT -> VERIFY -> COMPLETED
//!
//! any failure after BEGIN        -> ROLLBACK -> FAILED
//! any failure before BEGIN       -> FAILED
//! ```
//!
//! The source is checked and listed before the destination is touched, so a
//! bad connection never destroys an existing destination file. Everything
//! between BEGIN and COMMIT runs on one SQLite connection with foreign keys
//! off; they are switched on only after COMMIT, and VERIFY only reports.

use crate::Result;
use crate::adapters::sqlite::SqliteDestination;
use crate::adapters::{MigrationConfig, SourceAdapter};
use crate::copier::copy_table;
use crate::ddl::DdlGenerator;
use crate::error::Pg2SqliteError;
use crate::models::{
    MigrationPhase, MigrationResult, MigrationStatus, RunError, TableReport, VerificationReport,
};
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Bookkeeping for one run: the result being built and the current state.
struct RunState {
    result: MigrationResult,
    phase: MigrationPhase,
    started: Instant,
}

impl RunState {
    fn new() -> Self {
        let mut result = MigrationResult::new(uuid::Uuid::new_v4().to_string());
        result.phases.push(MigrationPhase::Init);
        Self {
            result,
            phase: MigrationPhase::Init,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, next: MigrationPhase) {
        debug!("Migration {}: {} -> {}", self.result.run_id, self.phase, next);
        self.phase = next;
        self.result.phases.push(next);
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.result.warnings.push(message);
    }

    fn record_error(&mut self, error: &Pg2SqliteError) {
        error!("Migration failed during {}: {}", self.phase, error.format_detailed());
        self.result.errors.push(RunError::from(error));
    }

    fn finish(mut self, status: MigrationStatus) -> MigrationResult {
        self.enter(match status {
            MigrationStatus::Completed => MigrationPhase::Completed,
            MigrationStatus::Failed => MigrationPhase::Failed,
        });
        self.result.status = status;
        self.result.duration_ms =
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.result
    }

    /// Records `error` and ends the run without a rollback.
    fn fail(mut self, error: &Pg2SqliteError) -> MigrationResult {
        self.record_error(error);
        self.finish(MigrationStatus::Failed)
    }
}

/// Runs one PostgreSQL to SQLite migration.
///
/// # Example
/// ```rust,no_run
/// use pg2sqlite_core::{MigrationConfig, Orchestrator, PostgresSource};
///
/// # async fn run() -> pg2sqlite_core::Result<()> {
/// let source = PostgresSource::new("postgres://postgres@localhost/ecommerce", "public").await?;
/// let orchestrator = Orchestrator::new(
///     Box::new(source),
///     "database.sqlite",
///     MigrationConfig::default(),
/// );
///
/// let result = orchestrator.run().await;
/// println!("{} rows copied", result.total_rows());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    source: Box<dyn SourceAdapter>,
    destination: PathBuf,
    config: MigrationConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("destination", &self.destination)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for a resolved source and destination path.
    pub fn new(
        source: Box<dyn SourceAdapter>,
        destination: impl Into<PathBuf>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            source,
            destination: destination.into(),
            config,
        }
    }

    /// Destination database path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Run configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Executes the migration and reports the outcome.
    ///
    /// Never returns an error: failures are recorded in
    /// [`MigrationResult::errors`] with status [`MigrationStatus::Failed`].
    pub async fn run(&self) -> MigrationResult {
        let mut run = RunState::new();
        info!(
            "Starting migration {} of schema '{}' into {}",
            run.result.run_id,
            self.source.schema(),
            self.destination.display()
        );

        if let Err(e) = self.validate() {
            return run.fail(&e);
        }

        run.enter(MigrationPhase::SchemaList);
        let tables = match self.list_source_tables().await {
            Ok(tables) => tables,
            Err(e) => return run.fail(&e),
        };
        if tables.is_empty() {
            run.warn(format!(
                "No tables found in schema '{}'",
                self.source.schema()
            ));
        } else {
            info!("Found {} tables: {}", tables.len(), tables.join(", "));
        }

        let mut destination = match SqliteDestination::create_fresh(&self.destination).await {
            Ok(destination) => destination,
            Err(e) => return run.fail(&e),
        };

        let mut tx = match destination.begin().await {
            Ok(tx) => tx,
            Err(e) => return run.fail(&e),
        };

        let loaded = self.load_tables(&mut tx, &tables, &mut run).await;
        let committed = match loaded {
            Ok(()) => {
                run.enter(MigrationPhase::Commit);
                tx.commit().await.map_err(|e| {
                    Pg2SqliteError::connection_failed("Failed to commit destination transaction", e)
                })
            }
            Err(e) => {
                run.record_error(&e);
                run.enter(MigrationPhase::Rollback);
                if let Err(rollback_error) = tx.rollback().await {
                    run.warn(format!("Rollback reported an error: {}", rollback_error));
                }
                Err(e)
            }
        };

        if let Err(e) = committed {
            // A failed COMMIT leaves the transaction open; closing the
            // connection rolls it back
            if run.phase == MigrationPhase::Commit {
                run.record_error(&e);
                run.enter(MigrationPhase::Rollback);
            }
            run.result.tables.clear();
            if let Err(close_error) = destination.close().await {
                run.warn(close_error.format_detailed());
            }
            info!("Migration rolled back; destination left empty");
            return run.finish(MigrationStatus::Failed);
        }

        info!(
            "Committed {} tables and {} rows",
            run.result.tables.len(),
            run.result.total_rows()
        );

        if let Err(e) = destination.enable_foreign_keys().await {
            run.warn(e.format_detailed());
        }

        if self.config.verify {
            run.enter(MigrationPhase::Verify);
            match destination.verify().await {
                Ok(report) => {
                    Self::check_report(&report, &mut run);
                    run.result.verification = Some(report);
                }
                Err(e) => run.warn(format!("Verification skipped: {}", e.format_detailed())),
            }
        }

        if let Err(e) = destination.close().await {
            run.warn(e.format_detailed());
        }

        let result = run.finish(MigrationStatus::Completed);
        info!(
            "Migration {} completed in {} ms: {} tables, {} rows, {} warnings",
            result.run_id,
            result.duration_ms,
            result.tables.len(),
            result.total_rows(),
            result.warnings.len()
        );
        result
    }

    /// Checks the run configuration against the source it will read.
    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.source.schema() != self.config.source_schema {
            return Err(Pg2SqliteError::configuration(format!(
                "Source reads schema '{}' but the run is configured for '{}'",
                self.source.schema(),
                self.config.source_schema
            )));
        }
        Ok(())
    }

    async fn list_source_tables(&self) -> Result<Vec<String>> {
        self.source.test_connection().await?;
        self.source.list_tables().await
    }

    /// Per-table phases, all inside `tx`.
    async fn load_tables(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        tables: &[String],
        run: &mut RunState,
    ) -> Result<()> {
        let migrated: HashSet<String> = tables.iter().cloned().collect();
        let mut ddl = DdlGenerator::new(self.config.if_not_exists);
        ddl.reserve_names(tables.iter().map(String::as_str));

        for (position, name) in tables.iter().enumerate() {
            run.enter(MigrationPhase::Describe);
            let table = self.source.describe_table(name).await?;

            run.enter(MigrationPhase::CreateTable);
            let table_ddl = ddl.generate_create_table(&table, &migrated);
            for warning in table_ddl.warnings {
                run.warn(warning);
            }
            sqlx::query(&table_ddl.statement)
                .execute(&mut **tx)
                .await
                .map_err(|e| Pg2SqliteError::ddl_failed(name, &table_ddl.statement, e))?;

            run.enter(MigrationPhase::CopyData);
            let rows_copied =
                copy_table(self.source.as_ref(), &mut **tx, &table, self.config.batch_size).await?;

            run.enter(MigrationPhase::CreateIndexes);
            let mut indexes_created = 0;
            for index in &table.indexes {
                if let Some(limitation) = index.unsupported {
                    run.warn(format!(
                        "Table '{}': skipped {} index '{}'",
                        name, limitation, index.name
                    ));
                    continue;
                }
                let statement = ddl.generate_create_index(name, index);
                sqlx::query(&statement)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| Pg2SqliteError::ddl_failed(name, &statement, e))?;
                indexes_created += 1;
            }

            info!(
                "[{}/{}] {}: {} rows, {} indexes, {} foreign keys",
                position + 1,
                tables.len(),
                name,
                rows_copied,
                indexes_created,
                table_ddl.foreign_keys_created
            );

            run.result.tables.push(TableReport {
                name: name.clone(),
                rows_copied,
                indexes_created,
                foreign_keys_created: table_ddl.foreign_keys_created,
            });
        }

        Ok(())
    }

    /// Turns verification findings into warnings.
    fn check_report(report: &VerificationReport, run: &mut RunState) {
        let mismatches: Vec<String> = run
            .result
            .tables
            .iter()
            .filter_map(|copied| {
                let found = report
                    .tables
                    .iter()
                    .find(|(name, _)| *name == copied.name)
                    .map(|(_, count)| *count);
                match found {
                    Some(count) if count == copied.rows_copied => None,
                    Some(count) => Some(format!(
                        "Table '{}' has {} rows after commit, expected {}",
                        copied.name, count, copied.rows_copied
                    )),
                    None => Some(format!("Table '{}' missing after commit", copied.name)),
                }
            })
            .collect();

        for mismatch in mismatches {
            run.warn(mismatch);
        }

        if let Some(check_error) = &report.foreign_key_check_error {
            run.warn(format!("Foreign key check could not run: {}", check_error));
        }

        if report.foreign_key_violations > 0 {
            run.warn(format!(
                "{} rows violate foreign key constraints",
                report.foreign_key_violations
            ));
        }
    }
}
