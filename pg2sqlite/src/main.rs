//! PostgreSQL to SQLite migration tool.
//!
//! This binary resolves the source connection and destination path from
//! flags and environment variables, runs one migration, and reports the
//! outcome on stdout.
//!
//! # Security Guarantees
//! - Read-only source sessions
//! - No credentials stored or logged
//! - Password prompts never echo

use clap::Parser;
use pg2sqlite::{Cli, render_summary, resolve_database_url};
use pg2sqlite_core::{error::redact_database_url, logging::init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet, cli.log_json)?;

    let database_url = resolve_database_url(&cli.source, || {
        rpassword::prompt_password("PostgreSQL password: ")
    })?;

    info!("Source: {}", redact_database_url(&database_url));
    info!("Destination: {}", cli.sqlite_file.display());

    let result = migrate(&cli, &database_url).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !cli.quiet {
        print!("{}", render_summary(&result, &cli.sqlite_file));
    }

    if !result.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

/// Builds the source and runs the migration.
#[cfg(feature = "postgresql")]
async fn migrate(
    cli: &Cli,
    database_url: &str,
) -> anyhow::Result<pg2sqlite_core::MigrationResult> {
    use pg2sqlite_core::{Orchestrator, PostgresSource};

    let source = PostgresSource::new(database_url, cli.schema.clone()).await?;
    let orchestrator =
        Orchestrator::new(Box::new(source), cli.sqlite_file.clone(), cli.migration_config());

    Ok(orchestrator.run().await)
}

#[cfg(not(feature = "postgresql"))]
async fn migrate(
    _cli: &Cli,
    _database_url: &str,
) -> anyhow::Result<pg2sqlite_core::MigrationResult> {
    anyhow::bail!("PostgreSQL support not available. Compile with --features postgresql")
}
