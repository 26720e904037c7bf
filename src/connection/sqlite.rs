use super::{Cursor, Driver};
use crate::config::MEMORY_PATH;
use crate::core::{Arguments, DatabaseError, Result, Row, Value};
use crate::dialect::sqlite::starts_transaction;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement};

/// Embedded database session backed by `rusqlite`.
pub struct SqliteDriver {
    conn: Option<Connection>,
}

impl SqliteDriver {
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == MEMORY_PATH {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(DatabaseError::connection)?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("connection is closed"))
    }
}

pub(crate) fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Bytea(b) => SqlValue::Blob(b.clone()),
        Value::Text(s) | Value::Json(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(t) => SqlValue::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::TimestampTz(t) => SqlValue::Text(t.to_rfc3339()),
        Value::Numeric(d) => SqlValue::Text(d.to_string()),
        Value::Uuid(u) => SqlValue::Text(u.to_string()),
    }
}

pub(crate) fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytea(b.to_vec()),
    }
}

fn bind(stmt: &mut Statement<'_>, args: &Arguments) -> Result<()> {
    match args {
        Arguments::Empty => Ok(()),
        Arguments::Positional(values) => {
            if values.len() != stmt.parameter_count() {
                return Err(rusqlite::Error::InvalidParameterCount(values.len(), stmt.parameter_count()).into());
            }
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, to_sqlite(value))?;
            }
            Ok(())
        }
        Arguments::Named(pairs) => {
            for (marker, value) in pairs {
                let index = stmt
                    .parameter_index(marker)?
                    .ok_or_else(|| DatabaseError::MissingParameter(marker.clone()))?;
                stmt.raw_bind_parameter(index, to_sqlite(value))?;
            }
            Ok(())
        }
    }
}

fn read_rows(stmt: &mut Statement<'_>) -> Result<Vec<Row>> {
    let width = stmt.column_count();
    let mut out = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get_ref(i).map(from_sqlite))
            .collect::<rusqlite::Result<Row>>()?;
        out.push(values);
    }
    Ok(out)
}

fn begin_if_needed(conn: &Connection, sql: &str) -> Result<()> {
    if conn.is_autocommit() && starts_transaction(sql) {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

impl Driver for SqliteDriver {
    fn execute(&mut self, sql: &str, args: &Arguments) -> Result<Cursor> {
        let conn = self.conn()?;
        begin_if_needed(conn, sql)?;

        let mut stmt = conn.prepare(sql)?;
        bind(&mut stmt, args)?;

        if stmt.column_count() == 0 {
            let changed = stmt.raw_execute()?;
            drop(stmt);
            let last_id = (changed > 0).then(|| conn.last_insert_rowid());
            return Ok(Cursor::affected(changed as u64, last_id));
        }

        let columns = stmt.column_names().into_iter().map(str::to_string).collect();
        let rows = read_rows(&mut stmt)?;
        Ok(Cursor::with_rows(columns, rows))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Arguments]) -> Result<u64> {
        let conn = self.conn()?;
        begin_if_needed(conn, sql)?;

        // Savepoint rolls back on drop, so an early return undoes every row.
        let savepoint = conn.savepoint()?;
        let mut total = 0;
        {
            let mut stmt = savepoint.prepare(sql)?;
            for args in rows {
                bind(&mut stmt, args)?;
                total += stmt.raw_execute()? as u64;
            }
        }
        savepoint.commit()?;
        Ok(total)
    }

    fn execute_script(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn()?;
        begin_if_needed(conn, sql)?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| e.into()),
            None => Ok(()),
        }
    }
}
