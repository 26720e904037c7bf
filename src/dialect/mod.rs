// Backend-specific SQL text: placeholder styles, rewrites, introspection
pub mod placeholders;
pub mod postgres;
pub mod sqlite;

pub use placeholders::{Bound, CompiledStatement};

use crate::config::BackendKind;
use crate::core::{
    ColumnSchema, DatabaseError, ForeignKey, Params, Record, Result, Row, Value, get_ci,
};
use crate::parser::normalize::is_ident_char;
use crate::parser::quotes::{ScannedScript, restore_tokens};
use indexmap::IndexMap;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    QuestionMark,
    /// `$1`
    Numbered,
    /// `%s`
    PercentPositional,
    /// `:name`
    NamedColon,
    /// `%(name)s`
    NamedPercent,
}

/// How the id generated by an insert is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// `INSERT ... RETURNING <id>`
    ReturningClause,
    /// Id exposed by the driver on the cursor.
    DriverLastId,
    /// A follow-up query on the same connection.
    LastIdQuery,
}

/// Test deciding whether a cached connection may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Only the thread that opened the connection may use it.
    ThreadAffinity,
    /// The driver reports whether the connection was closed.
    ClosedFlag,
}

/// A quoted literal lifted out of the text and turned into a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Injection {
    Positional { index: usize, value: Value },
    Named { name: String, value: Value },
}

/// Scanned text after dialect rewrites.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub text: String,
    /// Quote tokens still present in `text`.
    pub quotes: IndexMap<String, String>,
    pub injections: Vec<Injection>,
}

impl Rewrite {
    /// Puts the remaining quoted literals back into compiled SQL.
    #[must_use]
    pub fn restore(&self, sql: &str) -> String {
        restore_tokens(sql, &self.quotes)
    }

    /// Adds lifted literals to already-normalized parameters.
    #[must_use]
    pub fn inject(&self, params: Params) -> Params {
        if self.injections.is_empty() {
            return params;
        }
        match params {
            Params::Batch(rows) => Params::Batch(rows.into_iter().map(|r| self.inject_one(r)).collect()),
            single => self.inject_one(single),
        }
    }

    fn inject_one(&self, params: Params) -> Params {
        let named = self.injections.iter().any(|i| matches!(i, Injection::Named { .. }));
        let mut params = match params {
            Params::None if named => Params::Named(Record::new()),
            Params::None => Params::Positional(Vec::new()),
            Params::Named(r) if r.is_empty() && !named => Params::Positional(Vec::new()),
            other => other,
        };
        for injection in &self.injections {
            match (&mut params, injection) {
                (Params::Positional(values), Injection::Positional { index, value }) => {
                    let at = (*index).min(values.len());
                    values.insert(at, value.clone());
                }
                (Params::Named(record), Injection::Named { name, value }) => {
                    record.insert(name.clone(), value.clone());
                }
                (Params::Positional(values), Injection::Named { value, .. }) => {
                    values.push(value.clone());
                }
                _ => {}
            }
        }
        params
    }
}

fn is_plain_identifier(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') && name.chars().all(is_ident_char)
}

/// Replaces whole-word, case-insensitive occurrences of `from` with `to`.
fn replace_word_ci(text: &str, from: &str, to: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let needle = from.to_ascii_lowercase();
    let ends_ident = needle.ends_with(is_ident_char);

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (at, _) in lower.match_indices(&needle) {
        let before_ok = !text[..at].chars().next_back().is_some_and(|c| is_ident_char(c) || c == '.');
        let after_ok = !ends_ident || !text[at + needle.len()..].chars().next().is_some_and(is_ident_char);
        if before_ok && after_ok {
            out.push_str(&text[last..at]);
            out.push_str(to);
            last = at + needle.len();
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Column default as stored, or `None` for sequence-backed and null defaults.
#[must_use]
pub fn normalize_default(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let lower = raw.to_ascii_lowercase();
    if raw.is_empty() || lower == "null" || lower.starts_with("null::") {
        return None;
    }
    if lower.starts_with("nextval(") && lower.ends_with(')') {
        return None;
    }
    Some(raw.to_string())
}

fn text_field(record: &Record, key: &str) -> Option<String> {
    match get_ci(record, key) {
        None | Some(Value::Null) => None,
        Some(Value::Text(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn flag_field(record: &Record, key: &str) -> bool {
    get_ci(record, key).and_then(Value::as_bool).unwrap_or(false)
}

/// Builds a column description from one row of the schema query.
pub fn column_schema(record: &Record) -> Result<ColumnSchema> {
    let required = |key: &str| {
        text_field(record, key)
            .ok_or_else(|| DatabaseError::ParseError(format!("schema row without '{key}'")))
    };
    let foreign_key = match (
        text_field(record, "foreign_table_name"),
        text_field(record, "foreign_column_name"),
    ) {
        (Some(referenced_table), Some(referenced_column)) => Some(ForeignKey {
            referenced_table,
            referenced_column,
        }),
        _ => None,
    };
    Ok(ColumnSchema {
        name: required("columnName")?,
        data_type: text_field(record, "type").unwrap_or_default(),
        table: required("tableName")?,
        default: normalize_default(text_field(record, "columnDefault").as_deref()),
        nullable: flag_field(record, "nullable"),
        primary_key: flag_field(record, "is_primary_key"),
        foreign_key,
    })
}

/// Per-backend SQL behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl From<BackendKind> for Dialect {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Sqlite => Self::Sqlite,
            BackendKind::Postgres => Self::Postgres,
        }
    }
}

impl Dialect {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "SQLITE",
            Self::Postgres => "POSTGRES",
        }
    }

    /// Style the driver itself understands.
    #[must_use]
    pub const fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Sqlite => PlaceholderStyle::QuestionMark,
            Self::Postgres => PlaceholderStyle::Numbered,
        }
    }

    /// Styles a caller may write; all of them are compiled to the native one.
    #[must_use]
    pub const fn accepted_styles(self) -> &'static [PlaceholderStyle] {
        match self {
            Self::Sqlite => &[
                PlaceholderStyle::QuestionMark,
                PlaceholderStyle::NamedColon,
                PlaceholderStyle::PercentPositional,
                PlaceholderStyle::NamedPercent,
            ],
            Self::Postgres => &[
                PlaceholderStyle::Numbered,
                PlaceholderStyle::PercentPositional,
                PlaceholderStyle::NamedPercent,
                PlaceholderStyle::NamedColon,
            ],
        }
    }

    /// Positional marker used in generated statements.
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Sqlite => "?",
            Self::Postgres => "%s",
        }
    }

    #[must_use]
    pub const fn rewrite_table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Sqlite => sqlite::REWRITES,
            Self::Postgres => postgres::REWRITES,
        }
    }

    #[must_use]
    pub const fn schema_query(self) -> &'static str {
        match self {
            Self::Sqlite => sqlite::SCHEMA_QUERY,
            Self::Postgres => postgres::SCHEMA_QUERY,
        }
    }

    #[must_use]
    pub const fn identity_strategy(self) -> IdentityStrategy {
        match self {
            Self::Sqlite => IdentityStrategy::LastIdQuery,
            Self::Postgres => IdentityStrategy::ReturningClause,
        }
    }

    #[must_use]
    pub const fn liveness(self) -> Liveness {
        match self {
            Self::Sqlite => Liveness::ThreadAffinity,
            Self::Postgres => Liveness::ClosedFlag,
        }
    }

    /// Query reading back the last generated id, for `LastIdQuery` backends.
    #[must_use]
    pub fn last_insert_id_query(self, table: Option<&str>) -> Option<String> {
        match self.identity_strategy() {
            IdentityStrategy::LastIdQuery => Some(sqlite::last_insert_id_query(table)),
            _ => None,
        }
    }

    /// Double-quotes `name` unless it is a plain identifier.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_string()
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    /// Converts driver values into the canonical result representation.
    #[must_use]
    pub fn coerce_row(self, row: Row) -> Row {
        match self {
            Self::Sqlite => row,
            Self::Postgres => row
                .into_iter()
                .map(|v| match v {
                    Value::Numeric(d) => d.to_f64().map_or(Value::Numeric(d), Value::Real),
                    other => other,
                })
                .collect(),
        }
    }

    /// Applies the function alias table and, for PostgreSQL, lifts
    /// `LIKE '..%..'` literals into parameters.
    #[must_use]
    pub fn rewrite(self, scanned: &ScannedScript) -> Rewrite {
        let mut text = self
            .rewrite_table()
            .iter()
            .fold(scanned.text.clone(), |acc, (from, to)| replace_word_ci(&acc, from, to));
        let mut quotes = scanned.quotes.clone();
        let mut injections = Vec::new();
        if self == Self::Postgres {
            postgres::extract_like_literals(&mut text, &mut quotes, &mut injections);
        }
        Rewrite { text, quotes, injections }
    }

    /// Compiles rewritten text and normalized parameters into driver-ready form.
    pub fn compile(self, rewrite: &Rewrite, params: &Params) -> Result<CompiledStatement> {
        let compiled = placeholders::compile(self, &rewrite.text, params)?;
        Ok(CompiledStatement {
            sql: rewrite.restore(&compiled.sql),
            args: compiled.args,
        })
    }

    /// `INSERT INTO table ( cols ) VALUES ( markers )`, optionally returning a column.
    #[must_use]
    pub fn insert_statement(self, table: &str, columns: &[String], returning: Option<&str>) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let markers = vec![self.placeholder(); columns.len()];
        let mut sql = format!(
            "INSERT INTO {table} ( {} ) VALUES ( {} )",
            cols.join(", "),
            markers.join(", ")
        );
        if let Some(column) = returning {
            sql.push_str(&format!(" RETURNING {}", self.quote_identifier(column)));
        }
        sql
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
