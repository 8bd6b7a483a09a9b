//! PostgreSQL type names to SQLite storage classes, plus value and default
//! literal translation.
//!
//! All functions here are pure. Type names are matched case-insensitively by
//! whole-word prefix, so parameterized forms such as `character varying(255)`
//! or `numeric(10,2)` resolve to the same class as their base type while
//! `int4range` or `int2vector` do not match `int4` or `int2`.

use crate::models::{ColumnDescriptor, StorageClass, Value};
use regex::Regex;
use std::sync::OnceLock;

/// Ordered prefix rules; the first key that prefixes the type name at a
/// word boundary wins.
///
/// `timestamp` must stay ahead of `time`, and `interval` is listed
/// explicitly so it never falls into an integer rule.
const TYPE_RULES: &[(&str, StorageClass)] = &[
    ("smallint", StorageClass::Integer),
    ("integer", StorageClass::Integer),
    ("bigint", StorageClass::Integer),
    ("smallserial", StorageClass::Integer),
    ("bigserial", StorageClass::Integer),
    ("serial", StorageClass::Integer),
    ("int2", StorageClass::Integer),
    ("int4", StorageClass::Integer),
    ("int8", StorageClass::Integer),
    ("boolean", StorageClass::Integer),
    ("bool", StorageClass::Integer),
    ("real", StorageClass::Real),
    ("double precision", StorageClass::Real),
    ("float4", StorageClass::Real),
    ("float8", StorageClass::Real),
    ("numeric", StorageClass::Real),
    ("decimal", StorageClass::Real),
    ("money", StorageClass::Real),
    ("timestamp", StorageClass::Timestamp),
    ("bytea", StorageClass::Blob),
    ("interval", StorageClass::Text),
    ("character", StorageClass::Text),
    ("varchar", StorageClass::Text),
    ("char", StorageClass::Text),
    ("text", StorageClass::Text),
    ("citext", StorageClass::Text),
    ("uuid", StorageClass::Text),
    ("jsonb", StorageClass::Text),
    ("json", StorageClass::Text),
    ("xml", StorageClass::Text),
    ("date", StorageClass::Text),
    ("time", StorageClass::Text),
];

/// Maps a PostgreSQL type name to a SQLite storage class.
///
/// Total: unknown names (arrays, enums, geometric and network types, user
/// domains) fall back to [`StorageClass::Text`].
///
/// # Example
/// ```rust
/// use pg2sqlite_core::models::StorageClass;
/// use pg2sqlite_core::type_mapping::map_type;
///
/// assert_eq!(map_type("character varying(255)"), StorageClass::Text);
/// assert_eq!(map_type("timestamp with time zone"), StorageClass::Timestamp);
/// assert_eq!(map_type("BIGINT"), StorageClass::Integer);
/// ```
pub fn map_type(source_type: &str) -> StorageClass {
    let normalized = source_type.trim().to_lowercase();
    TYPE_RULES
        .iter()
        .find(|(prefix, _)| matches_type_prefix(&normalized, prefix))
        .map_or(StorageClass::Text, |(_, class)| *class)
}

/// True when `prefix` is the whole base name of `normalized`.
///
/// Only a modifier list or a following word may come after the prefix.
/// Array spellings (`integer[]`) are left to the TEXT fallback since they
/// are read as text.
fn matches_type_prefix(normalized: &str, prefix: &str) -> bool {
    normalized
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['(', ' ']))
}

/// Returns true for PostgreSQL boolean type names.
pub fn is_boolean_type(source_type: &str) -> bool {
    matches!(
        source_type.trim().to_lowercase().as_str(),
        "boolean" | "bool"
    )
}

/// Text spellings PostgreSQL accepts as boolean true.
fn is_true_marker(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "t" | "true" | "y" | "yes" | "on" | "1"
    )
}

fn is_false_marker(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "f" | "false" | "n" | "no" | "off" | "0"
    )
}

/// Converts a source value into its destination representation.
///
/// Only boolean columns are rewritten: every non-null value becomes
/// `Integer(0)` or `Integer(1)`. Values of other columns pass through
/// untouched. Applying the function twice yields the same value.
pub fn coerce_value(value: Value, source_type: &str) -> Value {
    if !is_boolean_type(source_type) {
        return value;
    }

    match value {
        Value::Bool(b) => Value::Integer(i64::from(b)),
        Value::Integer(i) => Value::Integer(i64::from(i != 0)),
        Value::Real(r) => Value::Integer(i64::from(r != 0.0)),
        Value::Text(text) => Value::Integer(i64::from(is_true_marker(&text))),
        other => other,
    }
}

/// Result of translating a column default into SQLite syntax.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefaultTranslation {
    /// Expression for the `DEFAULT` clause; `None` omits the clause
    pub expression: Option<String>,
    /// Set when the translation may not preserve source semantics
    pub warning: Option<String>,
}

impl DefaultTranslation {
    fn omitted() -> Self {
        Self::default()
    }

    fn expression(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            warning: None,
        }
    }
}

struct DefaultPatterns {
    /// Quoted or numeric literal followed by one or more `::type` casts
    cast_literal: Regex,
    numeric: Regex,
    current_timestamp: Regex,
}

impl DefaultPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<DefaultPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    #[allow(clippy::expect_used)]
    fn compile() -> Self {
        Self {
            cast_literal: Regex::new(
                r#"(?is)^('(?:[^']|'')*'|\(?[-+]?\d+(?:\.\d+)?(?:e[-+]?\d+)?\)?)((?:\s*::\s*"?[a-z_][a-z0-9_ ]*"?(?:\([0-9, ]*\))?(?:\[\])?)+)$"#,
            )
            .expect("Invalid cast literal pattern"),
            numeric: Regex::new(r"(?i)^[-+]?\d+(?:\.\d+)?(?:e[-+]?\d+)?$")
                .expect("Invalid numeric pattern"),
            current_timestamp: Regex::new(
                r"(?i)^(now\(\)|current_timestamp(\(\d\))?|localtimestamp(\(\d\))?|transaction_timestamp\(\)|statement_timestamp\(\)|clock_timestamp\(\))$",
            )
            .expect("Invalid timestamp function pattern"),
        }
    }
}

/// Strips one level of single quotes, unescaping doubled quotes.
fn unquote(literal: &str) -> Option<String> {
    literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
}

/// Translates a PostgreSQL column default into a SQLite `DEFAULT` expression.
///
/// Sequence defaults are dropped so SQLite's rowid takes over. Boolean
/// literals become `1`/`0`. Timestamp functions become `CURRENT_TIMESTAMP`.
/// Casted literals lose their cast. Anything else is copied verbatim with a
/// warning, since PostgreSQL-only expressions may not be valid in SQLite.
pub fn translate_default(column: &ColumnDescriptor) -> DefaultTranslation {
    let Some(raw) = column.default_value.as_deref().map(str::trim) else {
        return DefaultTranslation::omitted();
    };
    if raw.is_empty() {
        return DefaultTranslation::omitted();
    }

    let lower = raw.to_lowercase();
    if lower.starts_with("nextval(") {
        return DefaultTranslation::omitted();
    }

    let patterns = DefaultPatterns::instance();
    // Literal with any trailing casts removed, e.g. 'active'::character varying
    let literal = patterns
        .cast_literal
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());

    if is_boolean_type(&column.source_type) {
        let bare = unquote(literal).unwrap_or_else(|| literal.to_string());
        if is_true_marker(&bare) {
            return DefaultTranslation::expression("1");
        }
        if is_false_marker(&bare) {
            return DefaultTranslation::expression("0");
        }
        return DefaultTranslation {
            expression: None,
            warning: Some(format!(
                "Default '{}' on boolean column '{}' is not a boolean literal; dropped",
                raw, column.name
            )),
        };
    }

    if patterns.current_timestamp.is_match(&lower) {
        return DefaultTranslation::expression("CURRENT_TIMESTAMP");
    }
    match lower.as_str() {
        "current_date" => return DefaultTranslation::expression("CURRENT_DATE"),
        "current_time" | "localtime" => return DefaultTranslation::expression("CURRENT_TIME"),
        _ => {}
    }

    if lower == "null" || lower.starts_with("null::") {
        return DefaultTranslation::omitted();
    }

    if patterns.numeric.is_match(literal) {
        return DefaultTranslation::expression(literal);
    }
    // PostgreSQL renders negative defaults as (-1)
    if let Some(inner) = literal.strip_prefix('(').and_then(|s| s.strip_suffix(')'))
        && patterns.numeric.is_match(inner)
    {
        return DefaultTranslation::expression(inner);
    }

    if let Some(text) = unquote(literal) {
        let numeric_column = matches!(
            map_type(&column.source_type),
            StorageClass::Integer | StorageClass::Real
        );
        if numeric_column && patterns.numeric.is_match(&text) {
            return DefaultTranslation::expression(text);
        }
        if literal.len() != raw.len() || !literal.contains("::") {
            return DefaultTranslation::expression(literal);
        }
    }

    DefaultTranslation {
        expression: Some(raw.to_string()),
        warning: Some(format!(
            "Default '{}' on column '{}' copied verbatim; it may not be valid SQLite",
            raw, column.name
        )),
    }
}
