use super::Database;
use crate::core::{DatabaseError, Params, Record, Result, Row, Value};
use crate::result::QueryResult;
use std::path::{Path, PathBuf};

/// Default number of rows sent per batched execute.
pub const MAX_BUFFER: usize = 2000;

/// Side file receiving the rows of a buffer that failed to load.
pub const ERROR_FILE: &str = "error.csv";

#[derive(Debug, Clone)]
pub struct BulkLoadOptions {
    pub max_buffer_size: usize,
    pub error_file: PathBuf,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: MAX_BUFFER,
            error_file: PathBuf::from(ERROR_FILE),
        }
    }
}

impl BulkLoadOptions {
    #[must_use]
    pub fn with_buffer_size(mut self, n: usize) -> Self {
        self.max_buffer_size = n.max(1);
        self
    }

    #[must_use]
    pub fn with_error_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_file = path.into();
        self
    }
}

/// Tabular input for a bulk load.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSource {
    /// Column -> value mappings. The first record's keys are the columns;
    /// later records are laid out in that order and any other key is ignored.
    /// A record lacking one of the columns fails its buffer with
    /// `ShapeMismatch`.
    Records(Vec<Record>),
    /// Rows already laid out against `columns`.
    Frame { columns: Vec<String>, rows: Vec<Row> },
}

impl RowSource {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Frame { rows, .. } => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_frame(self) -> (Vec<String>, Vec<Row>) {
        match self {
            Self::Frame { columns, rows } => (columns, rows),
            Self::Records(records) => {
                let columns: Vec<String> = records
                    .first()
                    .map(|first| first.keys().cloned().collect())
                    .unwrap_or_default();
                let rows = records
                    .into_iter()
                    .map(|mut record| columns.iter().filter_map(|c| record.swap_remove(c)).collect())
                    .collect();
                (columns, rows)
            }
        }
    }
}

impl From<Vec<Record>> for RowSource {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records)
    }
}

impl From<QueryResult> for RowSource {
    fn from(result: QueryResult) -> Self {
        Self::Frame {
            columns: result.columns,
            rows: result.rows,
        }
    }
}

/// Progress after one buffer has been loaded.
///
/// `buffer` identifies the buffer (0, 1, 2, ...) and is not a row count;
/// `rows` is how many rows that buffer carried. Sum `rows` for a running
/// total, or read `BulkLoader::loaded_rows`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    /// Share of the source loaded so far, in `0.0..=1.0`.
    pub fraction: f64,
    /// Zero-based index of the buffer just loaded.
    pub buffer: usize,
    /// Rows in this buffer.
    pub rows: usize,
}

fn write_error_file(path: &Path, columns: &[String], rows: &[Row]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(Value::to_field))?;
    }
    writer.flush()?;
    Ok(())
}

/// Lazy, single-pass load of a row source into one table.
///
/// Each call to `next` executes one buffer. Buffers are not committed
/// individually: the connection is committed once the source is exhausted,
/// when a buffer fails (so earlier buffers stand), or when the loader is
/// dropped part way.
pub struct BulkLoader<'a> {
    db: &'a mut Database,
    table: String,
    sql: String,
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    total: usize,
    done: usize,
    buffer_index: usize,
    options: BulkLoadOptions,
    finished: bool,
}

impl<'a> BulkLoader<'a> {
    pub(crate) fn new(db: &'a mut Database, table: &str, source: RowSource, options: BulkLoadOptions) -> Self {
        let (columns, rows) = source.into_frame();
        let sql = db.dialect().insert_statement(table, &columns, None);
        let total = rows.len();
        Self {
            db,
            table: table.to_string(),
            sql,
            columns,
            rows: rows.into_iter(),
            total,
            done: 0,
            buffer_index: 0,
            options,
            finished: total == 0,
        }
    }

    #[must_use]
    pub const fn total_rows(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn loaded_rows(&self) -> usize {
        self.done
    }

    fn fail(&mut self, index: usize, buffer: &[Row], source: DatabaseError) -> DatabaseError {
        self.finished = true;
        log::error!(
            "Bulk load into {} stopped at buffer {index} ({} rows): {source}",
            self.table,
            buffer.len()
        );
        if let Err(e) = write_error_file(&self.options.error_file, &self.columns, buffer) {
            log::error!("Could not write {}: {e}", self.options.error_file.display());
        }
        self.db.commit();
        DatabaseError::BulkLoad {
            buffer: index,
            rows: buffer.len(),
            path: self.options.error_file.clone(),
            source: Box::new(source),
        }
    }
}

impl Iterator for BulkLoader<'_> {
    type Item = Result<LoadProgress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let buffer: Vec<Row> = self.rows.by_ref().take(self.options.max_buffer_size).collect();
        if buffer.is_empty() {
            self.finished = true;
            self.db.commit();
            log::info!("Loaded {} rows into {}", self.done, self.table);
            return None;
        }

        let index = self.buffer_index;
        self.buffer_index += 1;

        let batch = buffer
            .iter()
            .map(|row| Params::Positional(row.iter().cloned().map(Value::into_explicit_null).collect()))
            .collect();

        match self.db.execute_unguarded(&self.sql, &Params::Batch(batch)) {
            Ok(_) => {
                self.done += buffer.len();
                log::debug!("Buffer {index}: {}/{} rows into {}", self.done, self.total, self.table);
                Some(Ok(LoadProgress {
                    fraction: self.done as f64 / self.total as f64,
                    buffer: index,
                    rows: buffer.len(),
                }))
            }
            Err(e) => Some(Err(self.fail(index, &buffer, e))),
        }
    }
}

impl Drop for BulkLoader<'_> {
    fn drop(&mut self) {
        if !self.finished && self.done > 0 {
            self.db.commit();
        }
    }
}
