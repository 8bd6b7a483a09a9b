//! SELECT projection and typed decoding of source rows.
//!
//! Every column is cast in SQL to one of five wire types so decoding never
//! depends on the zoo of PostgreSQL types: `bool`, `int8`, `float8`, `text`
//! and `bytea`. Timestamps, dates, UUIDs, JSON, arrays and enums all arrive
//! as text, which the session's ISO date style keeps in ISO-8601 form.

use crate::Result;
use crate::ddl::quote_identifier;
use crate::error::Pg2SqliteError;
use crate::models::{ColumnDescriptor, Row, StorageClass, TableDescriptor, Value};
use crate::type_mapping::{is_boolean_type, map_type};
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// Wire type a column is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Bool,
    Integer,
    Real,
    Text,
    Blob,
}

impl Projection {
    /// Chooses the wire type for a column from its destination storage class.
    pub fn for_column(column: &ColumnDescriptor) -> Self {
        if is_boolean_type(&column.source_type) {
            return Projection::Bool;
        }
        match map_type(&column.source_type) {
            StorageClass::Integer => Projection::Integer,
            StorageClass::Real => Projection::Real,
            StorageClass::Blob => Projection::Blob,
            StorageClass::Text | StorageClass::Timestamp => Projection::Text,
        }
    }

    /// SQL expression reading `column` as this wire type.
    fn expression(self, column: &ColumnDescriptor) -> String {
        let name = quote_identifier(&column.name);
        match self {
            Projection::Bool | Projection::Blob => name,
            Projection::Integer => format!("{}::int8", name),
            // money has no direct cast to float8
            Projection::Real if column.source_type.trim().eq_ignore_ascii_case("money") => {
                format!("{}::numeric::float8", name)
            }
            Projection::Real => format!("{}::float8", name),
            Projection::Text => format!("{}::text", name),
        }
    }
}

/// Builds the SELECT that reads every row of `table` in descriptor column order.
///
/// # Example
/// ```rust
/// use pg2sqlite_core::adapters::postgres::build_select;
/// use pg2sqlite_core::models::{ColumnDescriptor, TableDescriptor};
///
/// let table = TableDescriptor::new(
///     "users",
///     vec![
///         ColumnDescriptor::new("id", "integer", 1),
///         ColumnDescriptor::new("active", "boolean", 2),
///     ],
/// );
/// assert_eq!(
///     build_select("public", &table),
///     r#"SELECT "id"::int8, "active" FROM "public"."users""#
/// );
/// ```
pub fn build_select(schema: &str, table: &TableDescriptor) -> String {
    let projection = table
        .columns
        .iter()
        .map(|column| Projection::for_column(column).expression(column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {} FROM {}.{}",
        projection,
        quote_identifier(schema),
        quote_identifier(&table.name)
    )
}

fn decode_cell(row: &PgRow, index: usize, column: &ColumnDescriptor, table: &str) -> Result<Value> {
    let decoded = match Projection::for_column(column) {
        Projection::Bool => row
            .try_get::<Option<bool>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Bool)),
        Projection::Integer => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Integer)),
        Projection::Real => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Real)),
        Projection::Text => row
            .try_get::<Option<String>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Text)),
        Projection::Blob => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Blob)),
    };

    decoded.map_err(|e| {
        Pg2SqliteError::data_failed(
            table,
            format!("Failed to decode column '{}'", column.name),
            e,
        )
    })
}

/// Decodes one result row positionally against the descriptor's columns.
pub(crate) fn decode_row(row: &PgRow, table: &TableDescriptor) -> Result<Row> {
    if row.len() != table.columns.len() {
        return Err(Pg2SqliteError::invalid_row(
            &table.name,
            format!(
                "Source returned {} columns, expected {}",
                row.len(),
                table.columns.len()
            ),
        ));
    }

    table
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| decode_cell(row, index, column, &table.name))
        .collect()
}

/// Streams decoded rows for `statement` straight from the server cursor.
pub(crate) fn stream_rows<'a>(
    pool: &'a PgPool,
    table: &'a TableDescriptor,
    statement: &'a str,
) -> BoxStream<'a, Result<Row>> {
    sqlx::query(statement)
        .fetch(pool)
        .map(move |fetched| {
            let row = fetched.map_err(|e| {
                Pg2SqliteError::data_failed(&table.name, "Failed to read row from source", e)
            })?;
            decode_row(&row, table)
        })
        .boxed()
}
