//! SQLite DDL generation from introspected table descriptors.
//!
//! All identifiers are double-quoted, so reserved words and mixed-case names
//! from the source survive unchanged.

use crate::models::{ForeignKeyDescriptor, IndexDescriptor, ReferentialAction, TableDescriptor};
use crate::type_mapping::{map_type, translate_default};
use std::collections::HashSet;

/// Quotes an identifier for SQLite (and PostgreSQL), doubling embedded quotes.
///
/// # Example
/// ```rust
/// use pg2sqlite_core::ddl::quote_identifier;
///
/// assert_eq!(quote_identifier("order"), r#""order""#);
/// assert_eq!(quote_identifier(r#"a"b"#), r#""a""b""#);
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE` statement plus what it kept and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDdl {
    pub statement: String,
    pub foreign_keys_created: usize,
    /// Fidelity problems: dropped foreign keys, verbatim or dropped defaults
    pub warnings: Vec<String>,
}

/// Generates destination DDL for one run.
///
/// Index names are synthesized as `idx_<table>_<columns>`; the generator
/// remembers every name it hands out so that two indexes never collide.
#[derive(Debug, Clone, Default)]
pub struct DdlGenerator {
    if_not_exists: bool,
    used_names: HashSet<String>,
}

impl DdlGenerator {
    /// Creates a generator; `if_not_exists` adds `IF NOT EXISTS` to every statement.
    pub fn new(if_not_exists: bool) -> Self {
        Self {
            if_not_exists,
            used_names: HashSet::new(),
        }
    }

    /// Marks names as taken, e.g. the tables being created.
    ///
    /// SQLite keeps tables and indexes in one namespace, so an index may not
    /// reuse a table name.
    pub fn reserve_names<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.used_names
            .extend(names.into_iter().map(str::to_lowercase));
    }

    fn if_not_exists_clause(&self) -> &'static str {
        if self.if_not_exists { "IF NOT EXISTS " } else { "" }
    }

    fn foreign_key_clause(fk: &ForeignKeyDescriptor) -> String {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            quoted_list(fk.columns.iter().map(String::as_str)),
            quote_identifier(&fk.referenced_table),
            quoted_list(fk.referenced_columns.iter().map(String::as_str)),
        );

        let actions = [("ON DELETE", fk.on_delete), ("ON UPDATE", fk.on_update)];
        for (keyword, action) in actions {
            if let Some(action) = action.filter(|a| *a != ReferentialAction::NoAction) {
                clause.push_str(&format!(" {} {}", keyword, action.as_sql()));
            }
        }

        clause
    }

    /// Returns why a foreign key cannot be recreated, if it cannot.
    fn foreign_key_problem(
        fk: &ForeignKeyDescriptor,
        migrated_tables: &HashSet<String>,
    ) -> Option<String> {
        if let Some(schema) = &fk.referenced_schema {
            return Some(format!(
                "references '{}.{}' outside the migrated schema",
                schema, fk.referenced_table
            ));
        }
        if !migrated_tables.contains(&fk.referenced_table) {
            return Some(format!(
                "references '{}' which is not being migrated",
                fk.referenced_table
            ));
        }
        if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
            return Some("has mismatched column lists".to_string());
        }
        None
    }

    /// Builds the `CREATE TABLE` statement for `table`.
    ///
    /// Foreign keys to tables outside `migrated_tables` are omitted and
    /// reported in [`TableDdl::warnings`].
    pub fn generate_create_table(
        &self,
        table: &TableDescriptor,
        migrated_tables: &HashSet<String>,
    ) -> TableDdl {
        let mut definitions = Vec::with_capacity(table.columns.len() + 1);
        let mut warnings = Vec::new();

        for column in &table.columns {
            let mut definition = format!(
                "{} {}",
                quote_identifier(&column.name),
                map_type(&column.source_type)
            );
            if !column.is_nullable {
                definition.push_str(" NOT NULL");
            }

            let default = translate_default(column);
            if let Some(expression) = default.expression {
                definition.push_str(" DEFAULT ");
                definition.push_str(&expression);
            }
            if let Some(warning) = default.warning {
                warnings.push(format!("Table '{}': {}", table.name, warning));
            }

            definitions.push(definition);
        }

        if !table.primary_key.is_empty() {
            definitions.push(format!(
                "PRIMARY KEY ({})",
                quoted_list(table.primary_key.iter().map(String::as_str))
            ));
        }

        let mut foreign_keys_created = 0;
        for fk in &table.foreign_keys {
            match Self::foreign_key_problem(fk, migrated_tables) {
                Some(problem) => warnings.push(format!(
                    "Table '{}': dropped foreign key {} ({}) because it {}",
                    table.name,
                    fk.name.as_deref().unwrap_or("<unnamed>"),
                    fk.columns.join(", "),
                    problem
                )),
                None => {
                    definitions.push(Self::foreign_key_clause(fk));
                    foreign_keys_created += 1;
                }
            }
        }

        let statement = format!(
            "CREATE TABLE {}{} (\n  {}\n)",
            self.if_not_exists_clause(),
            quote_identifier(&table.name),
            definitions.join(",\n  ")
        );

        TableDdl {
            statement,
            foreign_keys_created,
            warnings,
        }
    }

    /// Synthesizes a unique index name for `columns` of `table`.
    pub fn index_name(&mut self, table: &str, columns: &[String]) -> String {
        let base = format!("idx_{}_{}", table, columns.join("_"));
        let mut candidate = base.clone();
        let mut suffix = 2;
        // Names are compared case-insensitively, as SQLite does
        while !self.used_names.insert(candidate.to_lowercase()) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    /// Builds the `CREATE [UNIQUE] INDEX` statement for `index` on `table`.
    pub fn generate_create_index(&mut self, table: &str, index: &IndexDescriptor) -> String {
        let name = self.index_name(table, &index.columns);
        format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if index.is_unique { "UNIQUE " } else { "" },
            self.if_not_exists_clause(),
            quote_identifier(&name),
            quote_identifier(table),
            quoted_list(index.columns.iter().map(String::as_str))
        )
    }
}
