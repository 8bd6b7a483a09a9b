//! End-to-end migration tests against a scripted in-memory source.
//!
//! This test suite covers:
//! - Schema fidelity: primary keys, NOT NULL, defaults and boolean storage
//! - Foreign keys recreated between migrated tables and checked after commit
//! - All-or-nothing behavior when a table fails mid-run
//! - Empty tables, multi-batch copies and destination replacement
//!
//! Note: the source is a scripted [`SourceAdapter`], so no database server
//! is needed. The destination is a real SQLite file in a temp directory.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use pg2sqlite_core::{
    ColumnDescriptor, ErrorKind, ForeignKeyDescriptor, IndexDescriptor, IndexLimitation,
    MigrationConfig, MigrationPhase, MigrationStatus, Orchestrator, Pg2SqliteError,
    ReferentialAction, Result, Row, SourceAdapter, TableDescriptor, Value,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use tempfile::TempDir;

/// In-memory source that replays fixed tables and rows.
#[derive(Debug, Clone)]
struct ScriptedSource {
    schema: String,
    tables: Vec<(TableDescriptor, Vec<Row>)>,
    unreachable: bool,
    /// `(table, n)`: the row stream for `table` fails after `n` rows
    fail_after: Option<(String, usize)>,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            tables: Vec::new(),
            unreachable: false,
            fail_after: None,
        }
    }
}

impl ScriptedSource {
    fn in_schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    fn with_table(mut self, table: TableDescriptor, rows: Vec<Row>) -> Self {
        self.tables.push((table, rows));
        self
    }

    fn failing_after(mut self, table: &str, rows: usize) -> Self {
        self.fail_after = Some((table.to_string(), rows));
        self
    }

    fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn find(&self, table: &str) -> Option<&(TableDescriptor, Vec<Row>)> {
        self.tables.iter().find(|(t, _)| t.name == table)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn test_connection(&self) -> Result<()> {
        if self.unreachable {
            return Err(Pg2SqliteError::connection_failed(
                "Source refused connection",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ));
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.iter().map(|(t, _)| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.find(table).map(|(t, _)| t.columns.clone()).unwrap_or_default())
    }

    async fn describe_primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.find(table).map(|(t, _)| t.primary_key.clone()).unwrap_or_default())
    }

    async fn describe_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        Ok(self.find(table).map(|(t, _)| t.foreign_keys.clone()).unwrap_or_default())
    }

    async fn describe_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        Ok(self.find(table).map(|(t, _)| t.indexes.clone()).unwrap_or_default())
    }

    fn select_statement(&self, table: &TableDescriptor) -> String {
        format!("SELECT * FROM \"{}\"", table.name)
    }

    fn stream_rows<'a>(
        &'a self,
        table: &'a TableDescriptor,
        _statement: &'a str,
    ) -> BoxStream<'a, Result<Row>> {
        let rows = self.find(&table.name).map(|(_, rows)| rows.clone()).unwrap_or_default();
        let fail_at = self
            .fail_after
            .as_ref()
            .filter(|(name, _)| *name == table.name)
            .map(|(_, n)| *n);

        let items: Vec<Result<Row>> = match fail_at {
            Some(n) => rows
                .into_iter()
                .take(n)
                .map(Ok)
                .chain(std::iter::once(Err(Pg2SqliteError::data_failed(
                    &table.name,
                    "Failed to read row",
                    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
                ))))
                .collect(),
            None => rows.into_iter().map(Ok).collect(),
        };

        stream::iter(items).boxed()
    }
}

fn users() -> (TableDescriptor, Vec<Row>) {
    let mut table = TableDescriptor::new(
        "users",
        vec![
            ColumnDescriptor::new("id", "integer", 1)
                .not_null()
                .with_default("nextval('users_id_seq'::regclass)"),
            ColumnDescriptor::new("email", "character varying", 2).not_null(),
            ColumnDescriptor::new("is_active", "boolean", 3)
                .not_null()
                .with_default("true"),
            ColumnDescriptor::new("created_at", "timestamp without time zone", 4)
                .with_default("now()"),
        ],
    );
    table.primary_key = vec!["id".to_string()];
    table.indexes.push(IndexDescriptor::new(
        "users_email_key",
        vec!["email".to_string()],
        true,
    ));

    let rows = vec![
        vec![
            Value::Integer(1),
            Value::Text("alice@example.com".into()),
            Value::Bool(true),
            Value::Text("2024-01-15 09:30:00".into()),
        ],
        vec![
            Value::Integer(2),
            Value::Text("bob@example.com".into()),
            Value::Bool(false),
            Value::Null,
        ],
    ];
    (table, rows)
}

fn orders() -> (TableDescriptor, Vec<Row>) {
    let mut table = TableDescriptor::new(
        "orders",
        vec![
            ColumnDescriptor::new("id", "bigint", 1).not_null(),
            ColumnDescriptor::new("user_id", "integer", 2).not_null(),
            ColumnDescriptor::new("total", "numeric", 3),
        ],
    );
    table.primary_key = vec!["id".to_string()];
    let mut fk = ForeignKeyDescriptor::new("user_id", "users", "id");
    fk.name = Some("orders_user_id_fkey".to_string());
    fk.on_delete = Some(ReferentialAction::Cascade);
    table.foreign_keys.push(fk);

    let rows = vec![
        vec![Value::Integer(10), Value::Integer(1), Value::Real(19.99)],
        vec![Value::Integer(11), Value::Integer(1), Value::Real(5.0)],
        vec![Value::Integer(12), Value::Integer(2), Value::Null],
    ];
    (table, rows)
}

fn order_items() -> (TableDescriptor, Vec<Row>) {
    let mut table = TableDescriptor::new(
        "order_items",
        vec![
            ColumnDescriptor::new("order_id", "bigint", 1).not_null(),
            ColumnDescriptor::new("line", "smallint", 2).not_null(),
            ColumnDescriptor::new("sku", "text", 3).not_null(),
            ColumnDescriptor::new("quantity", "integer", 4)
                .not_null()
                .with_default("1"),
        ],
    );
    table.primary_key = vec!["order_id".to_string(), "line".to_string()];
    table
        .foreign_keys
        .push(ForeignKeyDescriptor::new("order_id", "orders", "id"));

    let rows = vec![
        vec![
            Value::Integer(10),
            Value::Integer(1),
            Value::Text("SKU-1".into()),
            Value::Integer(2),
        ],
        vec![
            Value::Integer(10),
            Value::Integer(2),
            Value::Text("SKU-2".into()),
            Value::Integer(1),
        ],
        vec![
            Value::Integer(12),
            Value::Integer(1),
            Value::Text("SKU-1".into()),
            Value::Integer(5),
        ],
    ];
    (table, rows)
}

fn ecommerce() -> ScriptedSource {
    let (u, u_rows) = users();
    let (o, o_rows) = orders();
    let (i, i_rows) = order_items();
    ScriptedSource::default()
        .with_table(u, u_rows)
        .with_table(o, o_rows)
        .with_table(i, i_rows)
}

async fn open(path: &Path) -> SqliteConnection {
    let options = SqliteConnectOptions::new().filename(path);
    SqliteConnection::connect_with(&options).await.unwrap()
}

async fn table_names(path: &Path) -> Vec<String> {
    let mut conn = open(path).await;
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&mut conn)
    .await
    .unwrap()
}

async fn count(path: &Path, table: &str) -> i64 {
    let mut conn = open(path).await;
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(&mut conn)
        .await
        .unwrap()
}

async fn migrate(
    source: ScriptedSource,
    path: &Path,
    config: MigrationConfig,
) -> pg2sqlite_core::MigrationResult {
    Orchestrator::new(Box::new(source), path, config).run().await
}

// =============================================================================
// Successful Runs
// =============================================================================

/// Tables, rows and constraints land in the destination
#[tokio::test]
async fn test_migrates_schema_and_rows() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let result = migrate(ecommerce(), &path, MigrationConfig::default()).await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.status, MigrationStatus::Completed);
    assert!(result.errors.is_empty());
    assert_eq!(result.total_rows(), 8);
    assert_eq!(result.table("users").map(|t| t.rows_copied), Some(2));
    assert_eq!(result.table("users").map(|t| t.indexes_created), Some(1));
    assert_eq!(result.table("orders").map(|t| t.foreign_keys_created), Some(1));
    assert_eq!(
        table_names(&path).await,
        vec!["order_items", "orders", "users"]
    );
    assert_eq!(count(&path, "order_items").await, 3);

    let verification = result.verification.as_ref().unwrap();
    assert_eq!(verification.foreign_key_violations, 0);
    assert!(verification.tables.contains(&("orders".to_string(), 3)));
    Ok(())
}

/// Tables are processed in name order and every state is recorded
#[tokio::test]
async fn test_records_phase_sequence() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let result = migrate(ecommerce(), &path, MigrationConfig::default()).await;

    let names: Vec<&str> = result.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["order_items", "orders", "users"]);

    assert_eq!(result.phases.first(), Some(&MigrationPhase::Init));
    assert_eq!(result.phases.get(1), Some(&MigrationPhase::SchemaList));
    assert_eq!(result.phases.last(), Some(&MigrationPhase::Completed));
    let copies = result
        .phases
        .iter()
        .filter(|p| **p == MigrationPhase::CopyData)
        .count();
    assert_eq!(copies, 3);
    assert!(result.phases.contains(&MigrationPhase::Commit));
    assert!(result.phases.contains(&MigrationPhase::Verify));
    assert!(!result.phases.contains(&MigrationPhase::Rollback));
    assert!(!result.run_id.is_empty());
    Ok(())
}

/// Booleans are stored as 0/1, NOT NULL and defaults survive
#[tokio::test]
async fn test_column_fidelity() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let result = migrate(ecommerce(), &path, MigrationConfig::default()).await;
    assert!(result.is_success());

    let mut conn = open(&path).await;
    let flags: Vec<(i64, i64)> =
        sqlx::query_as(r#"SELECT "id", "is_active" FROM "users" ORDER BY "id""#)
            .fetch_all(&mut conn)
            .await
            .unwrap();
    assert_eq!(flags, vec![(1, 1), (2, 0)]);

    let stored_type: String = sqlx::query_scalar(r#"SELECT typeof("is_active") FROM "users" LIMIT 1"#)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(stored_type, "integer");

    // (name, type, notnull, dflt_value, pk)
    let columns: Vec<(String, String, i64, Option<String>, i64)> =
        sqlx::query_as(r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info('users')"#)
            .fetch_all(&mut conn)
            .await
            .unwrap();
    assert_eq!(
        columns,
        vec![
            ("id".to_string(), "INTEGER".to_string(), 1, None, 1),
            ("email".to_string(), "TEXT".to_string(), 1, None, 0),
            ("is_active".to_string(), "INTEGER".to_string(), 1, Some("1".to_string()), 0),
            (
                "created_at".to_string(),
                "TIMESTAMP".to_string(),
                0,
                Some("CURRENT_TIMESTAMP".to_string()),
                0
            ),
        ]
    );

    // Composite key keeps its column order
    let key: Vec<(String, i64)> = sqlx::query_as(
        r#"SELECT name, pk FROM pragma_table_info('order_items') WHERE pk > 0 ORDER BY pk"#,
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();
    assert_eq!(key, vec![("order_id".to_string(), 1), ("line".to_string(), 2)]);
    Ok(())
}

/// Foreign keys are declared and enforced once the load is committed
#[tokio::test]
async fn test_foreign_keys_recreated() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let result = migrate(ecommerce(), &path, MigrationConfig::default()).await;
    assert!(result.is_success());

    let mut conn = open(&path).await;
    let fks: Vec<(String, String, String, String)> = sqlx::query_as(
        r#"SELECT "table", "from", "to", on_delete FROM pragma_foreign_key_list('orders')"#,
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();
    assert_eq!(
        fks,
        vec![(
            "users".to_string(),
            "user_id".to_string(),
            "id".to_string(),
            "CASCADE".to_string()
        )]
    );

    let item_fks: Vec<(String, String, String)> = sqlx::query_as(
        r#"SELECT "table", "from", "to" FROM pragma_foreign_key_list('order_items')"#,
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();
    assert_eq!(
        item_fks,
        vec![("orders".to_string(), "order_id".to_string(), "id".to_string())]
    );
    assert_eq!(count(&path, "order_items").await, 3);
    assert_eq!(count(&path, "orders").await, 3);

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .await
        .unwrap();
    let orphan = sqlx::query(r#"INSERT INTO "orders" ("id", "user_id") VALUES (99, 42)"#)
        .execute(&mut conn)
        .await;
    assert!(orphan.is_err(), "orphan row should be rejected");
    Ok(())
}

/// A foreign key to a table outside the run is dropped with a warning
#[tokio::test]
async fn test_foreign_key_to_unmigrated_table_is_warned() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let (o, o_rows) = orders();
    let source = ScriptedSource::default().with_table(o, o_rows);

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert!(result.is_success());
    assert_eq!(result.table("orders").map(|t| t.foreign_keys_created), Some(0));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("orders_user_id_fkey") && w.contains("users"))
    );
    assert_eq!(count(&path, "orders").await, 3);
    Ok(())
}

/// Empty tables are created and reported with zero rows
#[tokio::test]
async fn test_empty_table() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let (u, _) = users();
    let source = ScriptedSource::default().with_table(u, Vec::new());

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert!(result.is_success());
    assert_eq!(result.table("users").map(|t| t.rows_copied), Some(0));
    assert_eq!(table_names(&path).await, vec!["users"]);
    assert_eq!(count(&path, "users").await, 0);
    Ok(())
}

/// Rows spanning several batches are all copied
#[tokio::test]
async fn test_copies_across_batches() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let table = TableDescriptor::new(
        "events",
        vec![
            ColumnDescriptor::new("id", "integer", 1),
            ColumnDescriptor::new("payload", "bytea", 2),
        ],
    );
    let rows: Vec<Row> = (0..25)
        .map(|i| vec![Value::Integer(i), Value::Blob(vec![i as u8; 4])])
        .collect();
    let source = ScriptedSource::default().with_table(table, rows);

    let config = MigrationConfig::default().with_batch_size(7);
    let result = migrate(source, &path, config).await;

    assert!(result.is_success());
    assert_eq!(result.total_rows(), 25);
    assert_eq!(count(&path, "events").await, 25);

    let mut conn = open(&path).await;
    let payload: Vec<u8> = sqlx::query_scalar(r#"SELECT "payload" FROM "events" WHERE "id" = 24"#)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(payload, vec![24u8; 4]);
    Ok(())
}

/// No tables in the schema still produces an empty, valid destination
#[tokio::test]
async fn test_empty_schema() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let result = migrate(ScriptedSource::default(), &path, MigrationConfig::default()).await;

    assert!(result.is_success());
    assert!(result.tables.is_empty());
    assert!(result.warnings.iter().any(|w| w.contains("No tables")));
    assert!(table_names(&path).await.is_empty());
    Ok(())
}

/// Indexes SQLite cannot rebuild are skipped and reported as warnings
#[tokio::test]
async fn test_unsupported_indexes_are_reported() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let (mut u, u_rows) = users();
    let mut active = IndexDescriptor::new("users_active_idx", vec!["email".to_string()], false);
    active.unsupported = Some(IndexLimitation::Partial);
    let mut lower = IndexDescriptor::new("users_lower_email_idx", Vec::new(), false);
    lower.unsupported = Some(IndexLimitation::Expression);
    u.indexes.push(active);
    u.indexes.push(lower);

    let result = migrate(
        ScriptedSource::default().with_table(u, u_rows),
        &path,
        MigrationConfig::default(),
    )
    .await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.table("users").map(|t| t.indexes_created), Some(1));
    assert!(
        result
            .warnings
            .contains(&"Table 'users': skipped partial index 'users_active_idx'".to_string())
    );
    assert!(
        result
            .warnings
            .contains(&"Table 'users': skipped expression index 'users_lower_email_idx'".to_string())
    );

    let mut conn = open(&path).await;
    let created: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_index_list('users') WHERE origin = 'c'",
    )
    .fetch_one(&mut conn)
    .await
    .unwrap();
    assert_eq!(created, 1);
    Ok(())
}

/// A foreign key SQLite cannot check still leaves the row counts in the report
#[tokio::test]
async fn test_failed_foreign_key_check_keeps_counts() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    // Referenced column is neither a primary key nor unique
    let customers = TableDescriptor::new(
        "customers",
        vec![ColumnDescriptor::new("id", "integer", 1)],
    );
    let mut tickets = TableDescriptor::new(
        "tickets",
        vec![ColumnDescriptor::new("customer_id", "integer", 1)],
    );
    tickets
        .foreign_keys
        .push(ForeignKeyDescriptor::new("customer_id", "customers", "id"));
    let source = ScriptedSource::default()
        .with_table(customers, vec![vec![Value::Integer(1)]])
        .with_table(
            tickets,
            vec![vec![Value::Integer(1)], vec![Value::Integer(1)]],
        );

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    let verification = result.verification.as_ref().unwrap();
    assert_eq!(
        verification.tables,
        vec![("customers".to_string(), 1), ("tickets".to_string(), 2)]
    );
    assert!(verification.foreign_key_check_error.is_some());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.starts_with("Foreign key check could not run"))
    );
    Ok(())
}

/// Skipping verification leaves no report
#[tokio::test]
async fn test_verification_can_be_disabled() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let config = MigrationConfig::default().with_verify(false);
    let result = migrate(ecommerce(), &path, config).await;

    assert!(result.is_success());
    assert!(result.verification.is_none());
    assert!(!result.phases.contains(&MigrationPhase::Verify));
    Ok(())
}

// =============================================================================
// Failures and Rollback
// =============================================================================

/// A failure on the second of three tables leaves no tables behind
#[tokio::test]
async fn test_mid_run_failure_rolls_back_everything() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    // Processing order is order_items, orders, users
    let source = ecommerce().failing_after("orders", 1);

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ErrorKind::Data);
    assert_eq!(result.errors[0].table.as_deref(), Some("orders"));
    assert!(result.tables.is_empty());
    assert!(result.phases.contains(&MigrationPhase::Rollback));
    assert!(!result.phases.contains(&MigrationPhase::Commit));
    assert_eq!(result.phases.last(), Some(&MigrationPhase::Failed));

    assert!(path.exists());
    assert!(table_names(&path).await.is_empty());
    Ok(())
}

/// A statement SQLite rejects fails the run as a DDL error
#[tokio::test]
async fn test_rejected_ddl_rolls_back() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let (u, u_rows) = users();
    let broken = TableDescriptor::new(
        "zz_subscriptions",
        vec![
            ColumnDescriptor::new("renews_at", "timestamp with time zone", 1)
                .with_default("(now() + '1 day'::interval)"),
        ],
    );
    let source = ScriptedSource::default()
        .with_table(u, u_rows)
        .with_table(broken, Vec::new());

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors[0].kind, ErrorKind::Ddl);
    assert_eq!(result.errors[0].table.as_deref(), Some("zz_subscriptions"));
    assert!(table_names(&path).await.is_empty());
    Ok(())
}

/// A table without columns cannot be described
#[tokio::test]
async fn test_table_without_columns_fails() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let source = ScriptedSource::default().with_table(TableDescriptor::new("ghost", Vec::new()), Vec::new());

    let result = migrate(source, &path, MigrationConfig::default()).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors[0].kind, ErrorKind::Introspection);
    assert_eq!(result.errors[0].table.as_deref(), Some("ghost"));
    Ok(())
}

/// An unreachable source fails before the destination is touched
#[tokio::test]
async fn test_unreachable_source_keeps_existing_destination() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let first = migrate(ecommerce(), &path, MigrationConfig::default()).await;
    assert!(first.is_success());

    let result = migrate(ecommerce().unreachable(), &path, MigrationConfig::default()).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors[0].kind, ErrorKind::Connection);
    assert_eq!(
        result.phases,
        vec![
            MigrationPhase::Init,
            MigrationPhase::SchemaList,
            MigrationPhase::Failed
        ]
    );
    assert_eq!(table_names(&path).await, vec!["order_items", "orders", "users"]);
    Ok(())
}

/// Invalid configuration is rejected before any work starts
#[tokio::test]
async fn test_invalid_config_fails_immediately() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let config = MigrationConfig::default().with_source_schema("");
    let result = migrate(ecommerce(), &path, config).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors[0].kind, ErrorKind::Configuration);
    assert_eq!(
        result.phases,
        vec![MigrationPhase::Init, MigrationPhase::Failed]
    );
    assert!(!path.exists());
    Ok(())
}

/// A source reading another schema than the run names is rejected up front
#[tokio::test]
async fn test_schema_mismatch_fails_immediately() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let config = MigrationConfig::default().with_source_schema("sales");
    let result = migrate(ecommerce(), &path, config).await;

    assert_eq!(result.status, MigrationStatus::Failed);
    assert_eq!(result.errors[0].kind, ErrorKind::Configuration);
    assert!(result.errors[0].message.contains("sales"));
    assert_eq!(
        result.phases,
        vec![MigrationPhase::Init, MigrationPhase::Failed]
    );
    assert!(!path.exists());

    let matching = migrate(
        ecommerce().in_schema("sales"),
        &path,
        MigrationConfig::default().with_source_schema("sales"),
    )
    .await;
    assert!(matching.is_success(), "errors: {:?}", matching.errors);
    Ok(())
}

// =============================================================================
// Re-runs
// =============================================================================

/// A second run replaces the previous destination rather than appending
#[tokio::test]
async fn test_rerun_replaces_destination() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");

    let first = migrate(ecommerce(), &path, MigrationConfig::default()).await;
    assert!(first.is_success());

    let (u, u_rows) = users();
    let second = migrate(
        ScriptedSource::default().with_table(u, u_rows),
        &path,
        MigrationConfig::default(),
    )
    .await;
    assert!(second.is_success());
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(table_names(&path).await, vec!["users"]);
    assert_eq!(count(&path, "users").await, 2);
    Ok(())
}

/// Running twice with IF NOT EXISTS still yields the same rows
#[tokio::test]
async fn test_rerun_with_if_not_exists_is_idempotent() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    let config = MigrationConfig::default().with_if_not_exists(true);

    for _ in 0..2 {
        let result = migrate(ecommerce(), &path, config.clone()).await;
        assert!(result.is_success(), "errors: {:?}", result.errors);
    }

    assert_eq!(count(&path, "users").await, 2);
    assert_eq!(count(&path, "orders").await, 3);
    Ok(())
}
