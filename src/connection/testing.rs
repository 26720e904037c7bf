//! In-memory driver that records every call, for exercising the layers
//! above the driver without a database.

use super::{Connector, Cursor, Driver};
use crate::config::ConnectionConfig;
use crate::core::{Arguments, DatabaseError, Result, Row, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Execute(String, Arguments),
    ExecuteMany(String, Vec<Arguments>),
    ExecuteScript(String),
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

type FailWhen = Arc<dyn Fn(&str, &Arguments) -> bool + Send + Sync>;

/// Answers every query with the same canned result set.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    journal: Journal,
    columns: Vec<String>,
    rows: Vec<Row>,
    fail_when: Option<FailWhen>,
    fail_commit: bool,
    fail_rollback: bool,
}

impl RecordingConnector {
    pub fn with_rows(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            ..Self::default()
        }
    }

    /// Makes any statement (or batch row) matching `pred` fail.
    pub fn failing_when(mut self, pred: impl Fn(&str, &Arguments) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Arc::new(pred));
        self
    }

    /// Every commit is journaled and then fails.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Every rollback is journaled and then fails.
    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        self.journal.push(Call::Connect);
        Ok(Box::new(RecordingDriver {
            journal: self.journal.clone(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            fail_when: self.fail_when.clone(),
            fail_commit: self.fail_commit,
            fail_rollback: self.fail_rollback,
            closed: false,
        }))
    }
}

pub struct RecordingDriver {
    journal: Journal,
    columns: Vec<String>,
    rows: Vec<Row>,
    fail_when: Option<FailWhen>,
    fail_commit: bool,
    fail_rollback: bool,
    closed: bool,
}

impl RecordingDriver {
    fn fails(&self, sql: &str, args: &Arguments) -> bool {
        self.fail_when.as_ref().is_some_and(|f| f(sql, args))
    }
}

impl Driver for RecordingDriver {
    fn execute(&mut self, sql: &str, args: &Arguments) -> Result<Cursor> {
        self.journal.push(Call::Execute(sql.to_string(), args.clone()));
        if self.fails(sql, args) {
            return Err(DatabaseError::Driver("scripted failure".to_string()));
        }
        let head = sql.trim_start().to_ascii_uppercase();
        if head.starts_with("SELECT") || head.starts_with("WITH") || head.contains("RETURNING") {
            let rows = if head.contains("RETURNING") {
                vec![vec![Value::Integer(42)]]
            } else {
                self.rows.clone()
            };
            let columns = if self.columns.is_empty() {
                vec!["id".to_string()]
            } else {
                self.columns.clone()
            };
            Ok(Cursor::with_rows(columns, rows))
        } else {
            Ok(Cursor::affected(1, Some(7)))
        }
    }

    fn execute_many(&mut self, sql: &str, rows: &[Arguments]) -> Result<u64> {
        self.journal.push(Call::ExecuteMany(sql.to_string(), rows.to_vec()));
        if rows.iter().any(|r| self.fails(sql, r)) {
            return Err(DatabaseError::Driver("scripted failure".to_string()));
        }
        Ok(rows.len() as u64)
    }

    fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.journal.push(Call::ExecuteScript(sql.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.journal.push(Call::Commit);
        if self.fail_commit {
            return Err(DatabaseError::Driver("scripted commit failure".to_string()));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.journal.push(Call::Rollback);
        if self.fail_rollback {
            return Err(DatabaseError::Driver("scripted rollback failure".to_string()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<()> {
        self.journal.push(Call::Close);
        self.closed = true;
        Ok(())
    }
}
