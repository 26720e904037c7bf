// Driver seam, cursors and the cached connection
pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::{BackendKind, ConnectionConfig, MEMORY_PATH};
use crate::core::{Arguments, Result, Row};
use crate::dialect::{Dialect, Liveness};
use std::collections::VecDeque;
use std::thread::{self, ThreadId};

/// Rows produced by one statement, fully buffered by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    columns: Vec<String>,
    rows: VecDeque<Row>,
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl Cursor {
    #[must_use]
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            ..Self::default()
        }
    }

    /// Result of a statement that produced no result set.
    #[must_use]
    pub fn affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }

    /// Column names of the result set; empty when there is none.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn has_result_set(&self) -> bool {
        !self.columns.is_empty()
    }

    #[must_use]
    pub const fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Id generated by the statement, when the driver exposes one.
    #[must_use]
    pub const fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn fetch_one(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    pub fn fetch_many(&mut self, n: usize) -> Vec<Row> {
        let n = n.min(self.rows.len());
        self.rows.drain(..n).collect()
    }

    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch_one()
    }
}

/// A live session with one backend.
///
/// The first statement that changes data opens a transaction; it stays open
/// until `commit` or `rollback`.
pub trait Driver: Send {
    fn execute(&mut self, sql: &str, args: &Arguments) -> Result<Cursor>;

    /// Runs `sql` once per argument set. Either every row is applied or none.
    fn execute_many(&mut self, sql: &str, rows: &[Arguments]) -> Result<u64>;

    /// Runs several `;`-separated statements without parameters.
    fn execute_script(&mut self, sql: &str) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn close(&mut self) -> Result<()>;
}

/// Opens drivers; swapped out in tests.
pub trait Connector: Send {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Driver>>;
}

/// Connects to the backend named in the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendConnector;

impl Connector for BackendConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        match config.backend {
            BackendKind::Sqlite => {
                let path = config.file_path.as_deref().unwrap_or(MEMORY_PATH);
                Ok(Box::new(sqlite::SqliteDriver::open(path)?))
            }
            BackendKind::Postgres => Ok(Box::new(postgres::PostgresDriver::connect(config)?)),
        }
    }
}

/// A driver plus the thread that opened it.
pub struct ConnectionHandle {
    driver: Box<dyn Driver>,
    owner: ThreadId,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self {
            driver,
            owner: thread::current().id(),
        }
    }

    #[must_use]
    pub fn is_live(&self, liveness: Liveness) -> bool {
        if self.driver.is_closed() {
            return false;
        }
        match liveness {
            Liveness::ThreadAffinity => self.owner == thread::current().id(),
            Liveness::ClosedFlag => true,
        }
    }
}

/// Owns the single cached connection of a database instance.
///
/// The connection is opened lazily. A cached handle that fails the
/// dialect's liveness test is closed and replaced before it is handed out.
pub struct ConnectionManager {
    config: ConnectionConfig,
    dialect: Dialect,
    connector: Box<dyn Connector>,
    handle: Option<ConnectionHandle>,
    connect_count: usize,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Box<dyn Connector>) -> Self {
        let dialect = Dialect::from(config.backend);
        Self {
            config,
            dialect,
            connector,
            handle: None,
            connect_count: 0,
        }
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of physical connections opened so far.
    #[must_use]
    pub const fn connect_count(&self) -> usize {
        self.connect_count
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_live(self.dialect.liveness()))
    }

    fn open(&mut self) -> Result<ConnectionHandle> {
        let driver = self.connector.connect(&self.config)?;
        self.connect_count += 1;
        log::debug!("Opened {} connection #{}", self.dialect, self.connect_count);
        Ok(ConnectionHandle::new(driver))
    }

    /// Returns a usable driver, reconnecting at most once.
    pub fn driver(&mut self) -> Result<&mut dyn Driver> {
        let handle = match self.handle.take() {
            Some(handle) if handle.is_live(self.dialect.liveness()) => handle,
            stale => {
                if let Some(mut old) = stale {
                    log::debug!("Discarding stale {} connection", self.dialect);
                    if let Err(e) = old.driver.close() {
                        log::warn!("Failed to close stale connection: {e}");
                    }
                }
                self.open()?
            }
        };
        Ok(self.handle.insert(handle).driver.as_mut())
    }

    /// Commits on the cached connection; a no-op when none is open.
    pub fn commit(&mut self) -> Result<()> {
        match self.handle.as_mut() {
            Some(h) => h.driver.commit(),
            None => Ok(()),
        }
    }

    /// Rolls back on the cached connection; a no-op when none is open.
    pub fn rollback(&mut self) -> Result<()> {
        match self.handle.as_mut() {
            Some(h) => h.driver.rollback(),
            None => Ok(()),
        }
    }

    /// Closes and forgets the cached connection.
    pub fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut h) => h.driver.close(),
            None => Ok(()),
        }
    }

    /// Drops the cached connection and opens a fresh one.
    pub fn reconnect(&mut self) -> Result<()> {
        if let Err(e) = self.close() {
            log::warn!("Failed to close connection before reconnecting: {e}");
        }
        self.driver().map(|_| ())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close connection on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingConnector};
    use super::*;

    #[test]
    fn test_cursor_fetching() {
        let rows: Vec<Row> = (0..5).map(|i| vec![i.into()]).collect();
        let mut cursor = Cursor::with_rows(vec!["n".to_string()], rows);
        assert!(cursor.has_result_set());
        assert_eq!(cursor.fetch_one(), Some(vec![0.into()]));
        assert_eq!(cursor.fetch_many(2).len(), 2);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.fetch_all().len(), 2);
        assert_eq!(cursor.fetch_one(), None);
    }

    #[test]
    fn test_connection_is_lazy_and_cached() {
        let connector = RecordingConnector::default();
        let mut manager = ConnectionManager::new(ConnectionConfig::sqlite(MEMORY_PATH), Box::new(connector.clone()));
        assert_eq!(manager.connect_count(), 0);

        manager.driver().unwrap();
        manager.driver().unwrap();
        assert_eq!(manager.connect_count(), 1);
        assert!(manager.is_connected());
    }

    #[test]
    fn test_other_thread_gets_new_connection() {
        let connector = RecordingConnector::default();
        let mut manager = ConnectionManager::new(ConnectionConfig::sqlite(MEMORY_PATH), Box::new(connector.clone()));
        manager.driver().unwrap();

        let manager = thread::spawn(move || {
            manager.driver().unwrap();
            manager
        })
        .join()
        .unwrap();

        assert_eq!(manager.connect_count(), 2);
        assert!(connector.journal().calls().contains(&Call::Close));
    }

    #[test]
    fn test_closed_flag_survives_thread_change() {
        let connector = RecordingConnector::default();
        let config = ConnectionConfig::postgres("localhost", "app", "app");
        let mut manager = ConnectionManager::new(config, Box::new(connector));
        manager.driver().unwrap();

        let manager = thread::spawn(move || {
            manager.driver().unwrap();
            manager
        })
        .join()
        .unwrap();
        assert_eq!(manager.connect_count(), 1);
    }

    #[test]
    fn test_closed_connection_is_replaced() {
        let connector = RecordingConnector::default();
        let mut manager = ConnectionManager::new(ConnectionConfig::sqlite(MEMORY_PATH), Box::new(connector));
        manager.driver().unwrap().close().unwrap();
        assert!(!manager.is_connected());

        manager.driver().unwrap();
        assert_eq!(manager.connect_count(), 2);
    }

    #[test]
    fn test_commit_without_connection_is_noop() {
        let connector = RecordingConnector::default();
        let mut manager = ConnectionManager::new(ConnectionConfig::sqlite(MEMORY_PATH), Box::new(connector.clone()));
        manager.commit().unwrap();
        manager.rollback().unwrap();
        assert!(connector.journal().calls().is_empty());
    }
}
