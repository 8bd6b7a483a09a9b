//! Catalog queries for tables, columns, keys and indexes.
//!
//! Every failure here is fatal for the run and surfaces as an
//! introspection error scoped to the table being described.

use crate::Result;
use crate::adapters::helpers::RowExt;
use crate::error::Pg2SqliteError;
use crate::models::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, IndexLimitation, ReferentialAction,
};
use sqlx::PgPool;
use sqlx::postgres::PgRow;

/// Maps a `pg_constraint.confdeltype`/`confupdtype` code to a referential action.
pub fn map_referential_action(action_code: &str) -> Option<ReferentialAction> {
    match action_code {
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        "r" => Some(ReferentialAction::Restrict),
        "a" => Some(ReferentialAction::NoAction),
        _ => {
            tracing::warn!("Unknown referential action code: '{}'", action_code);
            None
        }
    }
}

async fn fetch_for_table(
    pool: &PgPool,
    query: &str,
    schema: &str,
    table: &str,
    what: &str,
) -> Result<Vec<PgRow>> {
    sqlx::query(query)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            Pg2SqliteError::introspection_failed(
                Some(table),
                format!("Failed to collect {} for table '{}.{}'", what, schema, table),
                e,
            )
        })
}

/// Base tables of `schema`, sorted bytewise so the order is stable across collations.
pub(crate) async fn list_tables(pool: &PgPool, schema: &str) -> Result<Vec<String>> {
    let query = r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema = $1
        AND table_type = 'BASE TABLE'
        ORDER BY table_name COLLATE "C"
    "#;

    let rows = sqlx::query(query)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            Pg2SqliteError::introspection_failed(
                None,
                format!("Failed to list tables in schema '{}'", schema),
                e,
            )
        })?;

    rows.iter()
        .map(|row| row.get_field("table_name", None))
        .collect()
}

pub(crate) async fn describe_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let query = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default,
            ordinal_position::int4 AS ordinal_position
        FROM information_schema.columns
        WHERE table_schema = $1
        AND table_name = $2
        ORDER BY ordinal_position
    "#;

    let rows = fetch_for_table(pool, query, schema, table, "columns").await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.get_field("column_name", Some(table))?;
        let data_type: String = row.get_field("data_type", Some(table))?;
        let is_nullable: String = row.get_field("is_nullable", Some(table))?;
        let default_value: Option<String> = row.get_field("column_default", Some(table))?;
        let ordinal_position: i32 = row.get_field("ordinal_position", Some(table))?;

        columns.push(ColumnDescriptor {
            name,
            source_type: data_type,
            is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
            default_value,
            ordinal_position: u32::try_from(ordinal_position).unwrap_or_default(),
        });
    }

    Ok(columns)
}

pub(crate) async fn describe_primary_key(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    let query = r#"
        SELECT kcu.column_name::text AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
        ORDER BY kcu.ordinal_position
    "#;

    let rows = fetch_for_table(pool, query, schema, table, "primary key").await?;

    rows.iter()
        .map(|row| row.get_field("column_name", Some(table)))
        .collect()
}

pub(crate) async fn describe_foreign_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyDescriptor>> {
    // Local and referenced columns are paired by their position in the key.
    // Constraint names are only unique per table, so everything is read
    // from the constraint row itself.
    let query = r#"
        SELECT
            con.conname::text AS constraint_name,
            con.confupdtype::text AS update_rule,
            con.confdeltype::text AS delete_rule,
            a.attname::text AS column_name,
            fns.nspname::text AS referenced_table_schema,
            fcl.relname::text AS referenced_table_name,
            fa.attname::text AS referenced_column_name
        FROM pg_constraint con
        JOIN pg_class cl ON con.conrelid = cl.oid
        JOIN pg_namespace ns ON cl.relnamespace = ns.oid
        JOIN pg_class fcl ON con.confrelid = fcl.oid
        JOIN pg_namespace fns ON fcl.relnamespace = fns.oid
        JOIN pg_attribute a ON a.attrelid = con.conrelid
        JOIN pg_attribute fa ON fa.attrelid = con.confrelid
        WHERE con.contype = 'f'
        AND ns.nspname = $1
        AND cl.relname = $2
        AND a.attnum = ANY(con.conkey)
        AND fa.attnum = ANY(con.confkey)
        AND array_position(con.conkey, a.attnum) = array_position(con.confkey, fa.attnum)
        ORDER BY con.conname, array_position(con.conkey, a.attnum)
    "#;

    let rows = fetch_for_table(pool, query, schema, table, "foreign keys").await?;

    // Rows arrive grouped by constraint name
    let mut foreign_keys: Vec<ForeignKeyDescriptor> = Vec::new();
    for row in &rows {
        let constraint_name: String = row.get_field("constraint_name", Some(table))?;
        let column: String = row.get_field("column_name", Some(table))?;
        let referenced_column: String = row.get_field("referenced_column_name", Some(table))?;

        if let Some(current) = foreign_keys
            .last_mut()
            .filter(|fk| fk.name.as_deref() == Some(constraint_name.as_str()))
        {
            current.columns.push(column);
            current.referenced_columns.push(referenced_column);
            continue;
        }

        let update_rule: String = row.get_field("update_rule", Some(table))?;
        let delete_rule: String = row.get_field("delete_rule", Some(table))?;
        let referenced_schema: String = row.get_field("referenced_table_schema", Some(table))?;
        let referenced_table: String = row.get_field("referenced_table_name", Some(table))?;

        foreign_keys.push(ForeignKeyDescriptor {
            name: Some(constraint_name),
            columns: vec![column],
            // Same-schema references are the only ones that can be migrated
            referenced_schema: (referenced_schema != schema).then_some(referenced_schema),
            referenced_table,
            referenced_columns: vec![referenced_column],
            on_delete: map_referential_action(&delete_rule),
            on_update: map_referential_action(&update_rule),
        });
    }

    Ok(foreign_keys)
}

/// One key column of a secondary index, before grouping.
struct IndexKeyRow {
    index_name: String,
    is_unique: bool,
    is_partial: bool,
    /// `None` for expression keys
    column_name: Option<String>,
}

/// Groups per-key rows into descriptors, flagging indexes SQLite cannot reproduce.
fn group_index_rows(rows: Vec<IndexKeyRow>) -> Vec<IndexDescriptor> {
    let mut indexes = Vec::new();
    let mut rows = rows.into_iter().peekable();

    while let Some(first) = rows.next() {
        let mut columns = Vec::new();
        let mut has_expression = first.column_name.is_none();
        columns.extend(first.column_name.clone());

        while let Some(next) = rows.next_if(|r| r.index_name == first.index_name) {
            has_expression |= next.column_name.is_none();
            columns.extend(next.column_name);
        }

        let mut index = IndexDescriptor::new(first.index_name, columns, first.is_unique);
        if first.is_partial {
            index.unsupported = Some(IndexLimitation::Partial);
        } else if has_expression {
            index.unsupported = Some(IndexLimitation::Expression);
        }
        indexes.push(index);
    }

    indexes
}

pub(crate) async fn describe_indexes(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<IndexDescriptor>> {
    // One row per key column; INCLUDE columns are left out and expression
    // keys come back with a NULL column name
    let query = r#"
        SELECT
            i.relname::text AS index_name,
            ix.indisunique AS is_unique,
            (ix.indpred IS NOT NULL) AS is_partial,
            a.attname::text AS column_name
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum AND k.attnum > 0
        WHERE n.nspname = $1
        AND t.relname = $2
        AND NOT ix.indisprimary
        AND k.ord <= ix.indnkeyatts
        ORDER BY i.relname, k.ord
    "#;

    let rows = fetch_for_table(pool, query, schema, table, "indexes").await?;

    let mut key_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        key_rows.push(IndexKeyRow {
            index_name: row.get_field("index_name", Some(table))?,
            is_unique: row.get_field("is_unique", Some(table))?,
            is_partial: row.get_field("is_partial", Some(table))?,
            column_name: row.get_field("column_name", Some(table))?,
        });
    }

    Ok(group_index_rows(key_rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: &str, column: Option<&str>) -> IndexKeyRow {
        IndexKeyRow {
            index_name: index.to_string(),
            is_unique: false,
            is_partial: false,
            column_name: column.map(str::to_string),
        }
    }

    #[test]
    fn test_group_index_rows_preserves_key_order() {
        let rows = vec![
            key("orders_customer_created_idx", Some("customer_id")),
            key("orders_customer_created_idx", Some("created_at")),
            key("orders_status_idx", Some("status")),
        ];

        let indexes = group_index_rows(rows);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].columns, vec!["customer_id", "created_at"]);
        assert_eq!(indexes[1].columns, vec!["status"]);
        assert!(indexes.iter().all(IndexDescriptor::is_supported));
    }

    #[test]
    fn test_group_index_rows_flags_partial_and_expression() {
        let mut partial = key("active_idx", Some("active"));
        partial.is_partial = true;
        let rows = vec![
            partial,
            key("lower_email_idx", None),
            key("name_idx", Some("name")),
        ];

        let indexes = group_index_rows(rows);
        assert_eq!(indexes.len(), 3);
        assert_eq!(indexes[0].unsupported, Some(IndexLimitation::Partial));
        assert_eq!(indexes[1].unsupported, Some(IndexLimitation::Expression));
        assert!(indexes[1].columns.is_empty());
        assert_eq!(indexes[2].name, "name_idx");
        assert!(indexes[2].is_supported());
    }

    #[test]
    fn test_map_referential_action() {
        assert_eq!(map_referential_action("c"), Some(ReferentialAction::Cascade));
        assert_eq!(map_referential_action("n"), Some(ReferentialAction::SetNull));
        assert_eq!(map_referential_action("d"), Some(ReferentialAction::SetDefault));
        assert_eq!(map_referential_action("r"), Some(ReferentialAction::Restrict));
        assert_eq!(map_referential_action("a"), Some(ReferentialAction::NoAction));
        assert_eq!(map_referential_action("CASCADE"), None);
    }
}
