//! Batched row transfer from a source table into the destination transaction.
//!
//! Rows are pulled from the source stream one at a time, coerced, and
//! flushed as multi-row `INSERT ... VALUES (...), (...)` statements. The
//! copier never commits; it only ever sees the orchestrator's transaction.

use crate::Result;
use crate::adapters::SourceAdapter;
use crate::ddl::quote_identifier;
use crate::error::Pg2SqliteError;
use crate::models::{Row, TableDescriptor, Value};
use crate::type_mapping::coerce_value;
use futures::TryStreamExt;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

/// Highest number of bound parameters SQLite accepts in one statement.
pub const SQLITE_MAX_VARIABLES: usize = 32766;

/// Rows per INSERT for a table with `column_count` columns.
///
/// Never zero, and small enough that `rows * columns` stays within
/// [`SQLITE_MAX_VARIABLES`].
pub fn effective_batch_size(batch_size: usize, column_count: usize) -> usize {
    let cap = (SQLITE_MAX_VARIABLES / column_count.max(1)).max(1);
    batch_size.clamp(1, cap)
}

/// Checks arity and coerces every cell for the destination.
pub fn prepare_row(table: &TableDescriptor, row: Row) -> Result<Row> {
    if row.len() != table.columns.len() {
        return Err(Pg2SqliteError::invalid_row(
            &table.name,
            format!(
                "Row has {} values but the table has {} columns",
                row.len(),
                table.columns.len()
            ),
        ));
    }

    Ok(row
        .into_iter()
        .zip(&table.columns)
        .map(|(value, column)| coerce_value(value, &column.source_type))
        .collect())
}

/// Inserts `rows` into `table` with a single multi-row INSERT.
///
/// Returns the number of rows written. An empty slice issues no statement.
pub async fn insert_batch(
    conn: &mut SqliteConnection,
    table: &TableDescriptor,
    rows: &[Row],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let columns = table
        .column_names()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ");
    let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        quote_identifier(&table.name),
        columns
    ));

    builder.push_values(rows, |mut tuple, row| {
        for value in row {
            match value {
                Value::Null => {
                    tuple.push_bind(None::<i64>);
                }
                Value::Bool(b) => {
                    tuple.push_bind(*b);
                }
                Value::Integer(i) => {
                    tuple.push_bind(*i);
                }
                Value::Real(r) => {
                    tuple.push_bind(*r);
                }
                Value::Text(text) => {
                    tuple.push_bind(text.as_str());
                }
                Value::Blob(bytes) => {
                    tuple.push_bind(bytes.as_slice());
                }
            }
        }
    });

    let result = builder.build().execute(&mut *conn).await.map_err(|e| {
        Pg2SqliteError::data_failed(
            &table.name,
            format!("Failed to insert batch of {} rows", rows.len()),
            e,
        )
    })?;

    Ok(result.rows_affected())
}

/// Copies every row of `table` from `source` into `conn`.
///
/// Returns the number of rows copied. A table without rows issues no INSERT.
///
/// # Errors
/// Returns a data error if a row cannot be read, has the wrong number of
/// values, or is rejected by SQLite
pub async fn copy_table(
    source: &dyn SourceAdapter,
    conn: &mut SqliteConnection,
    table: &TableDescriptor,
    batch_size: usize,
) -> Result<u64> {
    let batch_size = effective_batch_size(batch_size, table.columns.len());
    let statement = source.select_statement(table);
    let mut rows = source.stream_rows(table, &statement);

    let mut batch: Vec<Row> = Vec::with_capacity(batch_size);
    let mut copied = 0u64;

    while let Some(row) = rows.try_next().await? {
        batch.push(prepare_row(table, row)?);
        if batch.len() >= batch_size {
            copied += insert_batch(conn, table, &batch).await?;
            batch.clear();
            tracing::debug!("Copied {} rows into '{}' so far", copied, table.name);
        }
    }

    copied += insert_batch(conn, table, &batch).await?;

    Ok(copied)
}
