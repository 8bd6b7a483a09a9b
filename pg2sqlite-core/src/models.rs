//! Core data models for a migration run.
//!
//! Descriptors are produced by the source introspector and consumed by the
//! DDL generator and data copier. Column order inside a [`TableDescriptor`]
//! is significant everywhere: it fixes the DDL column order, the SELECT
//! projection and the placeholder order of every INSERT.

use crate::error::{ErrorKind, Pg2SqliteError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Destination storage classes a source type can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    Blob,
    /// Declared as `TIMESTAMP`, values are stored as ISO-8601 text
    Timestamp,
}

impl StorageClass {
    /// Declared column type used in destination DDL.
    pub fn as_sql(&self) -> &'static str {
        match self {
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
            StorageClass::Timestamp => "TIMESTAMP",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Source column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type name as reported by the source catalog (e.g. `character varying`)
    pub source_type: String,
    pub is_nullable: bool,
    /// Raw default expression in source syntax
    pub default_value: Option<String>,
    pub ordinal_position: u32,
}

impl ColumnDescriptor {
    /// Creates a nullable column without default.
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, ordinal_position: u32) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            is_nullable: true,
            default_value: None,
            ordinal_position,
        }
    }

    /// Builder method to mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Builder method to set the raw default expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

/// Referential actions for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    /// SQL keyword(s) for the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

/// Many-to-one relationship from `columns` to `referenced_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub name: Option<String>,
    /// Local columns, paired positionally with `referenced_columns`
    pub columns: Vec<String>,
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyDescriptor {
    /// Single-column foreign key without referential actions.
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            columns: vec![column.into()],
            referenced_schema: None,
            referenced_table: referenced_table.into(),
            referenced_columns: vec![referenced_column.into()],
            on_delete: None,
            on_update: None,
        }
    }
}

/// Why a source index cannot be recreated in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexLimitation {
    /// Has a `WHERE` predicate
    Partial,
    /// Has at least one expression key
    Expression,
}

impl std::fmt::Display for IndexLimitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexLimitation::Partial => write!(f, "partial"),
            IndexLimitation::Expression => write!(f, "expression"),
        }
    }
}

/// Secondary index metadata (never the primary-key index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name in the source; the destination name is synthesized
    pub name: String,
    /// Plain key columns; expression keys are left out
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// Set when the index is reported but not recreated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported: Option<IndexLimitation>,
}

impl IndexDescriptor {
    /// Index over plain columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>, is_unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique,
            unsupported: None,
        }
    }

    /// True when the index can be recreated in the destination.
    pub fn is_supported(&self) -> bool {
        self.unsupported.is_none()
    }
}

/// Everything needed to recreate and fill one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary-key columns in key order; empty when the table has none
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Creates a table descriptor with columns only.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Column names in descriptor order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Typed cell value moving from source to destination.
///
/// `Bool` only appears on the source side; coercion turns it into `Integer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One source row, positionally aligned with `TableDescriptor::columns`.
pub type Row = Vec<Value>;

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    Completed,
    Failed,
}

/// States of the migration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    Init,
    SchemaList,
    Describe,
    CreateTable,
    CopyData,
    CreateIndexes,
    Commit,
    Verify,
    Rollback,
    Completed,
    Failed,
}

impl MigrationPhase {
    /// True once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Failed)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MigrationPhase::Init => "INIT",
            MigrationPhase::SchemaList => "SCHEMA_LIST",
            MigrationPhase::Describe => "DESCRIBE",
            MigrationPhase::CreateTable => "CREATE_TABLE",
            MigrationPhase::CopyData => "COPY_DATA",
            MigrationPhase::CreateIndexes => "CREATE_INDEXES",
            MigrationPhase::Commit => "COMMIT",
            MigrationPhase::Verify => "VERIFY",
            MigrationPhase::Rollback => "ROLLBACK",
            MigrationPhase::Completed => "COMPLETED",
            MigrationPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Per-table outcome inside the run's transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    pub rows_copied: u64,
    pub indexes_created: usize,
    pub foreign_keys_created: usize,
}

/// Serializable projection of an error recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub table: Option<String>,
    pub message: String,
}

impl From<&Pg2SqliteError> for RunError {
    fn from(error: &Pg2SqliteError) -> Self {
        Self {
            kind: error.kind(),
            table: error.table().map(str::to_string),
            message: error.format_detailed(),
        }
    }
}

/// Destination state observed after COMMIT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// `(table, row_count)` in destination catalog order
    pub tables: Vec<(String, u64)>,
    pub foreign_key_violations: u64,
    /// Set when `PRAGMA foreign_key_check` itself failed, e.g. on a key
    /// whose parent columns are not unique; `foreign_key_violations` is
    /// then 0 and meaningless
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_check_error: Option<String>,
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub status: MigrationStatus,
    /// Tables in processing order; counts are discarded with the transaction on rollback
    pub tables: Vec<TableReport>,
    pub errors: Vec<RunError>,
    pub warnings: Vec<String>,
    pub verification: Option<VerificationReport>,
    /// States traversed, in order
    pub phases: Vec<MigrationPhase>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl MigrationResult {
    /// Creates an empty result for a run that is starting now.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: MigrationStatus::Failed,
            tables: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            verification: None,
            phases: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// True when the run reached `COMPLETED`.
    pub fn is_success(&self) -> bool {
        self.status == MigrationStatus::Completed
    }

    /// Sum of rows copied across tables.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    /// Looks up the report for a table by name.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.name == name)
    }
}
