// Turning cursors into rows, records, CSV and JSON
use crate::connection::Cursor;
use crate::core::{Record, Result, Row, Value, zip_record};
use crate::dialect::Dialect;
use serde::Serialize;
use std::io::Write;

/// Outcome of a read with an optional limit.
///
/// A limit of exactly one yields `Single` or `Empty` instead of a
/// one-element list.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized<T> {
    Rows(Vec<T>),
    Single(T),
    Empty,
}

impl<T> Materialized<T> {
    #[must_use]
    pub fn from_vec(items: Vec<T>, limit: Option<usize>) -> Self {
        if limit == Some(1) {
            items.into_iter().next().map_or(Self::Empty, Self::Single)
        } else {
            Self::Rows(items)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(items) => items.len(),
            Self::Single(_) => 1,
            Self::Empty => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn single(&self) -> Option<&T> {
        match self {
            Self::Single(item) => Some(item),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Rows(items) => items,
            Self::Single(item) => vec![item],
            Self::Empty => Vec::new(),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Materialized<U> {
        match self {
            Self::Rows(items) => Materialized::Rows(items.into_iter().map(f).collect()),
            Self::Single(item) => Materialized::Single(f(item)),
            Self::Empty => Materialized::Empty,
        }
    }
}

pub type RecordResult = Materialized<Record>;

/// Column names in result order, together with the rows they describe.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively when there is no exact hit.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| zip_record(&self.columns, row.clone()))
            .collect()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows.into_iter().map(|row| zip_record(&columns, row)).collect()
    }

    /// Rows applying the single-row rule for `limit`.
    #[must_use]
    pub fn materialize(self, limit: Option<usize>) -> Materialized<Row> {
        Materialized::from_vec(self.rows, limit)
    }

    /// JSON array of objects keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Value::to_json))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Header line plus one line per row; nulls become empty fields.
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut out = csv_writer(writer, delimiter);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row.iter().map(Value::to_field))?;
        }
        out.flush()?;
        Ok(())
    }
}

fn csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer)
}

fn next_row(cursor: &mut Cursor, dialect: Dialect, taken: usize, limit: Option<usize>) -> Option<Row> {
    if limit.is_some_and(|n| taken >= n) {
        return None;
    }
    cursor.fetch_one().map(|row| dialect.coerce_row(row))
}

/// Drains up to `limit` rows, coerced for the dialect.
pub fn fetch(cursor: &mut Cursor, dialect: Dialect, limit: Option<usize>) -> QueryResult {
    let columns = cursor.columns().to_vec();
    let rows = match limit {
        Some(n) => cursor.fetch_many(n),
        None => cursor.fetch_all(),
    };
    let rows = rows.into_iter().map(|row| dialect.coerce_row(row)).collect();
    QueryResult::new(columns, rows)
}

/// Rows as positional tuples.
pub fn rows(cursor: &mut Cursor, dialect: Dialect, limit: Option<usize>) -> Materialized<Row> {
    fetch(cursor, dialect, limit).materialize(limit)
}

/// Rows as column -> value mappings.
pub fn records(cursor: &mut Cursor, dialect: Dialect, limit: Option<usize>) -> RecordResult {
    let result = fetch(cursor, dialect, limit);
    Materialized::from_vec(result.into_records(), limit)
}

/// Streams rows into a delimiter-separated sink. Returns the number of rows written.
pub fn write_csv<W: Write>(
    cursor: &mut Cursor,
    dialect: Dialect,
    writer: W,
    delimiter: u8,
    limit: Option<usize>,
) -> Result<usize> {
    let mut out = csv_writer(writer, delimiter);
    out.write_record(cursor.columns())?;
    let mut written = 0;
    while let Some(row) = next_row(cursor, dialect, written, limit) {
        out.write_record(row.iter().map(Value::to_field))?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Hands each row, with the column names, to `f`. Stops at the first error.
pub fn for_each<F>(cursor: &mut Cursor, dialect: Dialect, limit: Option<usize>, mut f: F) -> Result<usize>
where
    F: FnMut(&[String], Row) -> Result<()>,
{
    let columns = cursor.columns().to_vec();
    let mut seen = 0;
    while let Some(row) = next_row(cursor, dialect, seen, limit) {
        f(&columns, row)?;
        seen += 1;
    }
    Ok(seen)
}

/// Fixed-size slices of a cursor, at most `limit` rows in total.
///
/// Every batch carries the column names so it can be used on its own.
#[derive(Debug)]
pub struct Batches {
    cursor: Cursor,
    dialect: Dialect,
    batch_size: usize,
    remaining: Option<usize>,
}

impl Batches {
    #[must_use]
    pub fn new(cursor: Cursor, dialect: Dialect, batch_size: usize, limit: Option<usize>) -> Self {
        Self {
            cursor,
            dialect,
            batch_size: batch_size.max(1),
            remaining: limit,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.cursor.columns()
    }
}

impl Iterator for Batches {
    type Item = QueryResult;

    fn next(&mut self) -> Option<Self::Item> {
        let size = match self.remaining {
            Some(0) => return None,
            Some(left) => left.min(self.batch_size),
            None => self.batch_size,
        };
        let batch = fetch(&mut self.cursor, self.dialect, Some(size));
        if batch.is_empty() {
            return None;
        }
        if let Some(left) = self.remaining.as_mut() {
            *left -= batch.len();
        }
        Some(batch)
    }
}
