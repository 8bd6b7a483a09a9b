//! Library module for the pg2sqlite binary.
//!
//! Holds the argument definitions and the input resolution the binary
//! performs before handing off to the migration engine, so both can be
//! tested without spawning a process.

use clap::{ArgAction, Args, Parser};
use pg2sqlite_core::security::{Credentials, build_postgres_url};
use pg2sqlite_core::{
    MigrationConfig, MigrationPhase, MigrationResult, MigrationStatus, Pg2SqliteError,
    adapters::DEFAULT_BATCH_SIZE,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "pg2sqlite")]
#[command(about = "Migrate a PostgreSQL schema and its data into a fresh SQLite file")]
#[command(version)]
#[command(long_about = "
pg2sqlite - PostgreSQL to SQLite snapshot migration

Recreates every base table of one PostgreSQL schema in a new SQLite file,
with primary keys, foreign keys, NOT NULL constraints, defaults and indexes,
then copies all rows inside a single transaction. Either everything lands or
the destination is left empty.

SECURITY FEATURES:
- Read-only source sessions
- Passwords never printed; URLs are redacted in logs

EXAMPLES:
  pg2sqlite --database-url postgres://user@localhost/shop -o shop.sqlite
  PGPASSWORD=secret pg2sqlite --pg-host db --pg-user app --pg-db shop
  pg2sqlite --pg-db shop --pg-user app --prompt-password --json
")]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Destination SQLite file (replaced if it exists)
    #[arg(
        short = 'o',
        long = "sqlite-file",
        default_value = "database.sqlite",
        help = "Destination SQLite file; an existing file is replaced"
    )]
    pub sqlite_file: PathBuf,

    /// Source schema
    #[arg(long, default_value = "public", help = "PostgreSQL schema to migrate")]
    pub schema: String,

    /// Rows per INSERT
    #[arg(
        long,
        default_value_t = DEFAULT_BATCH_SIZE,
        help = "Rows per multi-row INSERT"
    )]
    pub batch_size: usize,

    /// Emit IF NOT EXISTS
    #[arg(long, help = "Use CREATE ... IF NOT EXISTS for tables and indexes")]
    pub if_not_exists: bool,

    /// Skip verification
    #[arg(long, help = "Skip the post-commit row count and foreign key check")]
    pub no_verify: bool,

    /// Print the result as JSON
    #[arg(long, help = "Print the migration result as JSON on stdout")]
    pub json: bool,

    /// Log as JSON
    #[arg(long, help = "Write log lines to stderr as JSON objects")]
    pub log_json: bool,

    /// Increase verbosity
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Where the PostgreSQL connection comes from.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        hide_env_values = true,
        help = "PostgreSQL connection string (credentials will be sanitized in logs)"
    )]
    pub database_url: Option<String>,

    /// PostgreSQL host
    #[arg(long, default_value = "localhost", help = "PostgreSQL host")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5432, help = "PostgreSQL port")]
    pub pg_port: u16,

    /// PostgreSQL user
    #[arg(long, help = "PostgreSQL user")]
    pub pg_user: Option<String>,

    /// PostgreSQL password
    #[arg(
        long,
        env = "PGPASSWORD",
        hide_env_values = true,
        help = "PostgreSQL password (prefer the PGPASSWORD environment variable)"
    )]
    pub pg_password: Option<String>,

    /// PostgreSQL database
    #[arg(long, help = "PostgreSQL database; selects the discrete connection options")]
    pub pg_db: Option<String>,

    /// Prompt for the password
    #[arg(long, help = "Prompt for the PostgreSQL password on the terminal")]
    pub prompt_password: bool,
}

impl Cli {
    /// Migration settings selected by the flags.
    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::new()
            .with_source_schema(self.schema.clone())
            .with_batch_size(self.batch_size)
            .with_if_not_exists(self.if_not_exists)
            .with_verify(!self.no_verify)
    }
}

/// Resolves the PostgreSQL connection URL.
///
/// `--pg-db` selects the discrete options and takes precedence over
/// `--database-url`/`DATABASE_URL`. `prompt` is only called when
/// `--prompt-password` is set and no password was given.
///
/// # Errors
/// Returns a configuration error when neither form is complete or the URL
/// is not a PostgreSQL URL
pub fn resolve_database_url<F>(
    args: &SourceArgs,
    prompt: F,
) -> pg2sqlite_core::Result<Zeroizing<String>>
where
    F: FnOnce() -> std::io::Result<String>,
{
    if let Some(database) = args.pg_db.as_deref() {
        let username = args.pg_user.clone().ok_or_else(|| {
            Pg2SqliteError::configuration("--pg-user is required together with --pg-db")
        })?;

        let password = match (&args.pg_password, args.prompt_password) {
            (Some(password), _) => Some(password.clone()),
            (None, true) => Some(prompt().map_err(|e| {
                Pg2SqliteError::configuration(format!("Failed to read password: {}", e))
            })?),
            (None, false) => None,
        };

        let credentials = Credentials::new(username, password);
        return build_postgres_url(&args.pg_host, args.pg_port, database, &credentials);
    }

    let Some(database_url) = args.database_url.as_deref() else {
        return Err(Pg2SqliteError::configuration(
            "A source is required: pass --database-url (or set DATABASE_URL) or --pg-db with --pg-user",
        ));
    };

    let parsed = url::Url::parse(database_url).map_err(|e| {
        Pg2SqliteError::configuration(format!("Invalid database URL: {}", e))
    })?;
    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(Pg2SqliteError::configuration(format!(
            "Unsupported URL scheme '{}': expected postgres:// or postgresql://",
            parsed.scheme()
        )));
    }

    Ok(Zeroizing::new(database_url.to_string()))
}

/// Human-readable run summary printed on stdout.
pub fn render_summary(result: &MigrationResult, destination: &Path) -> String {
    let mut out = String::new();
    match result.status {
        MigrationStatus::Completed => {
            let _ = writeln!(out, "Migration completed successfully");
        }
        MigrationStatus::Failed if result.phases.contains(&MigrationPhase::Rollback) => {
            let _ = writeln!(
                out,
                "Migration failed and was rolled back; destination left without tables"
            );
        }
        MigrationStatus::Failed => {
            let _ = writeln!(
                out,
                "Migration failed before the destination was opened; existing file left untouched"
            );
        }
    }
    let _ = writeln!(out, "Run: {}", result.run_id);
    let _ = writeln!(out, "Output: {}", destination.display());

    if result.is_success() {
        let _ = writeln!(out, "Tables: {}", result.tables.len());
        let _ = writeln!(out, "Rows: {}", result.total_rows());
        for table in &result.tables {
            let _ = writeln!(
                out,
                "  {:<32} {:>10} rows  {} indexes  {} foreign keys",
                table.name, table.rows_copied, table.indexes_created, table.foreign_keys_created
            );
        }
    }

    if !result.warnings.is_empty() {
        let _ = writeln!(out, "Warnings: {}", result.warnings.len());
        for warning in &result.warnings {
            let _ = writeln!(out, "  - {}", warning);
        }
    }

    for error in &result.errors {
        let _ = writeln!(out, "Error [{}]: {}", error.kind, error.message);
    }

    let _ = writeln!(out, "Duration: {} ms", result.duration_ms);
    out
}
