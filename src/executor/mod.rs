/// Executor module - runs scripts against the configured backend
///
/// Structure:
/// - statement: quote scanning, dialect rewrite, normalization, compilation
/// - bulk: buffered bulk loads with an error side file
pub mod bulk;
pub mod statement;

pub use bulk::{BulkLoadOptions, BulkLoader, ERROR_FILE, LoadProgress, MAX_BUFFER, RowSource};
pub use statement::{PreparedStatement, prepare};

use crate::config::ConnectionConfig;
use crate::connection::{BackendConnector, ConnectionManager, Connector, Cursor};
use crate::core::{ColumnSchema, DatabaseError, Params, Record, Result, Row, Value};
use crate::dialect::{Dialect, IdentityStrategy, column_schema};
use crate::result::{self, Batches, Materialized, QueryResult, RecordResult};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Column read back after an insert unless configured otherwise.
pub const DEFAULT_ID_COLUMN: &str = "id";

const EXPORT_STEM: &str = "export_data";

/// Options for a single script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum rows to read back; `Some(1)` yields a single row.
    pub limit: Option<usize>,
    /// Log and swallow execution errors instead of returning them.
    pub ignore_error: bool,
}

impl RunOptions {
    #[must_use]
    pub const fn limit(n: usize) -> Self {
        Self {
            limit: Some(n),
            ignore_error: false,
        }
    }

    #[must_use]
    pub const fn ignoring_errors(mut self) -> Self {
        self.ignore_error = true;
        self
    }
}

/// One backend instance: configuration, dialect and the cached connection.
///
/// Not meant to be shared between threads without external locking; a
/// handle moved to another thread reconnects when the dialect requires it.
pub struct Database {
    manager: ConnectionManager,
    dialect: Dialect,
    id_column: String,
    max_buffer_size: usize,
}

impl Database {
    /// Creates an instance that connects on first use.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_connector(config, Box::new(BackendConnector))
    }

    /// Parses a connection string and creates an instance for it.
    pub fn open(uri: &str) -> Result<Self> {
        Self::new(ConnectionConfig::from_uri(uri)?)
    }

    pub fn with_connector(config: ConnectionConfig, connector: Box<dyn Connector>) -> Result<Self> {
        let config = config.validate()?;
        let manager = ConnectionManager::new(config, connector);
        Ok(Self {
            dialect: manager.dialect(),
            manager,
            id_column: DEFAULT_ID_COLUMN.to_string(),
            max_buffer_size: bulk::MAX_BUFFER,
        })
    }

    #[must_use]
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    #[must_use]
    pub fn with_max_buffer_size(mut self, n: usize) -> Self {
        self.max_buffer_size = n.max(1);
        self
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        self.manager.config()
    }

    #[must_use]
    pub const fn connect_count(&self) -> usize {
        self.manager.connect_count()
    }

    /// Opens the connection now instead of on the first statement.
    pub fn connect(&mut self) -> Result<()> {
        self.manager.driver().map(|_| ())
    }

    /// Runs a script without commit or rollback around it.
    pub(crate) fn execute_unguarded(&mut self, script: &str, params: &Params) -> Result<Cursor> {
        let dialect = self.dialect;
        let driver = self.manager.driver()?;
        let prepared = statement::prepare(dialect, script, params)?;
        statement::run(driver, &prepared)
    }

    /// Runs one script. A failure is rolled back, then either returned with
    /// the script and parameters attached or, with `ignore_error`, logged
    /// and reported as `Ok(None)`.
    ///
    /// Connection failures are always returned.
    pub fn execute(&mut self, script: &str, params: impl Into<Params>, ignore_error: bool) -> Result<Option<Cursor>> {
        let params = params.into();
        self.manager.driver()?;

        match self.execute_unguarded(script, &params) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(DatabaseError::Connection(msg)) => Err(DatabaseError::Connection(msg)),
            Err(e) => {
                self.rollback();
                if ignore_error {
                    log::warn!("Ignored error: {e}\n  script: {script}\n  params: {}", params.describe());
                    Ok(None)
                } else {
                    Err(DatabaseError::Execution {
                        script: script.to_string(),
                        params: params.describe(),
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    /// Runs a script, reads every row and commits.
    pub fn run_script(&mut self, script: &str, params: impl Into<Params>) -> Result<QueryResult> {
        let result = self.run_script_with(script, params, RunOptions::default())?;
        Ok(result.unwrap_or_default())
    }

    /// Runs a script with a row limit and error policy, then commits.
    pub fn run_script_with(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        options: RunOptions,
    ) -> Result<Option<QueryResult>> {
        let Some(mut cursor) = self.execute(script, params, options.ignore_error)? else {
            return Ok(None);
        };
        let result = result::fetch(&mut cursor, self.dialect, options.limit);
        self.commit();
        Ok(Some(result))
    }

    /// Reads a script from `path` and runs it.
    pub fn run_script_file(&mut self, path: impl AsRef<Path>, params: impl Into<Params>) -> Result<QueryResult> {
        let script = std::fs::read_to_string(path.as_ref())?;
        self.run_script(&script, params)
    }

    /// Rows as tuples; `limit == Some(1)` gives `Single` or `Empty`.
    pub fn fetch_rows(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        limit: Option<usize>,
    ) -> Result<Materialized<Row>> {
        let result = self.run_script_with(script, params, RunOptions { limit, ignore_error: false })?;
        Ok(result.unwrap_or_default().materialize(limit))
    }

    /// Rows as column -> value records; `limit == Some(1)` gives `Single` or `Empty`.
    pub fn fetch_records(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        limit: Option<usize>,
    ) -> Result<RecordResult> {
        let result = self.run_script_with(script, params, RunOptions { limit, ignore_error: false })?;
        Ok(Materialized::from_vec(result.unwrap_or_default().into_records(), limit))
    }

    /// Streams rows with their column names to `f`. Returns the number of rows seen.
    pub fn for_each_row<F>(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        limit: Option<usize>,
        f: F,
    ) -> Result<usize>
    where
        F: FnMut(&[String], Row) -> Result<()>,
    {
        let Some(mut cursor) = self.execute(script, params, false)? else {
            return Ok(0);
        };
        let seen = result::for_each(&mut cursor, self.dialect, limit, f)?;
        self.commit();
        Ok(seen)
    }

    /// Runs a query and hands its rows back in batches of `batch_size`,
    /// at most `limit` rows in total.
    pub fn run_as_batch(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        batch_size: usize,
        limit: Option<usize>,
    ) -> Result<Batches> {
        let cursor = self.execute(script, params, false)?.unwrap_or_default();
        self.commit();
        Ok(Batches::new(cursor, self.dialect, batch_size, limit))
    }

    /// Writes the result of a query as delimiter-separated text.
    ///
    /// Without a path the file goes to the downloads directory (or the
    /// working directory) as `export_data.csv`, never overwriting an
    /// existing file. Returns the path written.
    pub fn export_csv(
        &mut self,
        script: &str,
        params: impl Into<Params>,
        path: Option<&Path>,
        delimiter: u8,
    ) -> Result<PathBuf> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let dir = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
                unique_path(&dir, EXPORT_STEM, "csv")
            }
        };
        let mut cursor = self.execute(script, params, false)?.unwrap_or_default();
        let file = BufWriter::new(File::create(&target)?);
        let written = result::write_csv(&mut cursor, self.dialect, file, delimiter, None)?;
        self.commit();
        log::info!("Exported {written} rows to {}", target.display());
        Ok(target)
    }

    /// Inserts one record and commits. With `retrieve_id` the generated key
    /// of the id column is read back using the dialect's identity strategy.
    pub fn insert(&mut self, table: &str, record: &Record, retrieve_id: bool) -> Result<Option<Value>> {
        let columns: Vec<String> = record.keys().cloned().collect();
        let strategy = self.dialect.identity_strategy();
        let returning = (retrieve_id && strategy == IdentityStrategy::ReturningClause)
            .then_some(self.id_column.as_str());
        let sql = self.dialect.insert_statement(table, &columns, returning);
        let values: Vec<Value> = record.values().cloned().map(Value::into_explicit_null).collect();

        let Some(mut cursor) = self.execute(&sql, values, false)? else {
            return Ok(None);
        };

        let id = if retrieve_id {
            match strategy {
                IdentityStrategy::ReturningClause => cursor.fetch_one().and_then(|row| row.into_iter().next()),
                IdentityStrategy::DriverLastId => cursor.last_insert_id().map(Value::Integer),
                IdentityStrategy::LastIdQuery => match self.dialect.last_insert_id_query(Some(table)) {
                    Some(query) => self
                        .execute(&query, Params::None, false)?
                        .and_then(|mut c| c.fetch_one())
                        .and_then(|row| row.into_iter().next()),
                    None => None,
                },
            }
        } else {
            None
        };

        self.commit();
        Ok(id)
    }

    /// Starts a lazy bulk load; see [`BulkLoader`].
    pub fn bulk_load(&mut self, table: &str, source: impl Into<RowSource>, options: BulkLoadOptions) -> BulkLoader<'_> {
        BulkLoader::new(self, table, source.into(), options)
    }

    /// Loads every row of `source` with the default options and this
    /// instance's buffer size. Returns the number of rows loaded.
    pub fn insert_many(&mut self, table: &str, source: impl Into<RowSource>) -> Result<usize> {
        let options = BulkLoadOptions::default().with_buffer_size(self.max_buffer_size);
        self.insert_many_with(table, source, options)
    }

    pub fn insert_many_with(
        &mut self,
        table: &str,
        source: impl Into<RowSource>,
        options: BulkLoadOptions,
    ) -> Result<usize> {
        let mut loaded = 0;
        for progress in self.bulk_load(table, source, options) {
            loaded += progress?.rows;
        }
        Ok(loaded)
    }

    /// Column descriptions for every user table, in the same shape for
    /// both backends.
    pub fn schema(&mut self) -> Result<Vec<ColumnSchema>> {
        let result = self.run_script(self.dialect.schema_query(), Params::None)?;
        result.records().iter().map(column_schema).collect()
    }

    /// Best-effort commit; a failure is logged, never returned.
    pub fn commit(&mut self) {
        if let Err(e) = self.manager.commit() {
            log::warn!("Commit failed: {e}");
        }
    }

    /// Best-effort rollback; a failure is logged, never returned.
    pub fn rollback(&mut self) {
        if let Err(e) = self.manager.rollback() {
            log::warn!("Rollback failed: {e}");
        }
    }

    /// Best-effort close of the cached connection.
    pub fn close(&mut self) {
        if let Err(e) = self.manager.close() {
            log::warn!("Close failed: {e}");
        }
    }

    /// Replaces the cached connection with a fresh one.
    pub fn reconnect(&mut self) -> Result<()> {
        log::info!("Reconnecting to {}", self.dialect);
        self.manager.reconnect()
    }
}

/// `dir/stem.ext`, or `dir/stem_N.ext` with the first free `N`.
pub(crate) fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.{ext}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{n}.{ext}"));
        n += 1;
    }
    candidate
}
