use super::{Cursor, Driver};
use crate::config::{ConnectionConfig, POSTGRES_DEFAULT_PORT};
use crate::core::{Arguments, DatabaseError, Result, Row, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use postgres::{Client, NoTls, Statement};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error;
use std::str::FromStr;
use uuid::Uuid;

type Param = Box<dyn ToSql + Sync>;

/// A NULL the server accepts for a parameter of any type.
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(&self, _: &Type, _: &mut BytesMut) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

fn bad_bind(value: &Value, ty: &Type) -> DatabaseError {
    DatabaseError::Driver(format!("cannot bind {value:?} to a {ty} parameter"))
}

fn parse_text<T>(s: &str, value: &Value, ty: &Type) -> Result<Param>
where
    T: FromStr + ToSql + Sync + 'static,
{
    s.trim()
        .parse::<T>()
        .map(|v| Box::new(v) as Param)
        .map_err(|_| bad_bind(value, ty))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| s.trim().parse())
        .ok()
}

fn text_to_postgres(s: &str, value: &Value, ty: &Type) -> Result<Param> {
    if *ty == Type::INT2 {
        parse_text::<i16>(s, value, ty)
    } else if *ty == Type::INT4 {
        parse_text::<i32>(s, value, ty)
    } else if *ty == Type::INT8 {
        parse_text::<i64>(s, value, ty)
    } else if *ty == Type::FLOAT4 {
        parse_text::<f32>(s, value, ty)
    } else if *ty == Type::FLOAT8 {
        parse_text::<f64>(s, value, ty)
    } else if *ty == Type::NUMERIC {
        parse_text::<Decimal>(s, value, ty)
    } else if *ty == Type::BOOL {
        parse_text::<bool>(s, value, ty)
    } else if *ty == Type::DATE {
        parse_text::<NaiveDate>(s, value, ty)
    } else if *ty == Type::TIMESTAMP {
        let t = parse_timestamp(s).ok_or_else(|| bad_bind(value, ty))?;
        Ok(Box::new(t))
    } else if *ty == Type::TIMESTAMPTZ {
        parse_text::<DateTime<Utc>>(s, value, ty)
    } else if *ty == Type::UUID {
        parse_text::<Uuid>(s, value, ty)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        let json: serde_json::Value = serde_json::from_str(s)?;
        Ok(Box::new(json))
    } else {
        Ok(Box::new(s.to_string()))
    }
}

/// Converts a value to what the prepared statement expects at that slot.
pub(crate) fn to_postgres(value: &Value, ty: &Type) -> Result<Param> {
    if value.is_null() {
        return Ok(Box::new(SqlNull));
    }
    if is_text(ty) {
        return Ok(Box::new(match value {
            Value::Text(s) | Value::Json(s) => s.clone(),
            other => other.to_string(),
        }));
    }

    let out: Param = match (value, ty) {
        (Value::Integer(i), t) if *t == Type::INT2 => {
            Box::new(i16::try_from(*i).map_err(|_| bad_bind(value, ty))?)
        }
        (Value::Integer(i), t) if *t == Type::INT4 => {
            Box::new(i32::try_from(*i).map_err(|_| bad_bind(value, ty))?)
        }
        (Value::Integer(i), t) if *t == Type::FLOAT4 => Box::new(*i as f32),
        (Value::Integer(i), t) if *t == Type::FLOAT8 => Box::new(*i as f64),
        (Value::Integer(i), t) if *t == Type::NUMERIC => Box::new(Decimal::from(*i)),
        (Value::Integer(i), t) if *t == Type::BOOL => Box::new(*i != 0),
        (Value::Integer(i), _) => Box::new(*i),
        (Value::Real(r), t) if *t == Type::FLOAT4 => Box::new(*r as f32),
        (Value::Real(r), t) if *t == Type::NUMERIC => {
            Box::new(Decimal::try_from(*r).map_err(|_| bad_bind(value, ty))?)
        }
        (Value::Real(r), _) => Box::new(*r),
        (Value::Numeric(d), t) if *t == Type::FLOAT8 => {
            Box::new(d.to_f64().ok_or_else(|| bad_bind(value, ty))?)
        }
        (Value::Numeric(d), t) if *t == Type::FLOAT4 => {
            Box::new(d.to_f32().ok_or_else(|| bad_bind(value, ty))?)
        }
        (Value::Numeric(d), _) => Box::new(*d),
        (Value::Boolean(b), _) => Box::new(*b),
        (Value::Date(d), _) => Box::new(*d),
        (Value::Timestamp(t), ty) if *ty == Type::TIMESTAMPTZ => Box::new(t.and_utc()),
        (Value::Timestamp(t), _) => Box::new(*t),
        (Value::TimestampTz(t), ty) if *ty == Type::TIMESTAMP => Box::new(t.naive_utc()),
        (Value::TimestampTz(t), _) => Box::new(*t),
        (Value::Uuid(u), _) => Box::new(*u),
        (Value::Json(raw), _) => Box::new(serde_json::from_str::<serde_json::Value>(raw)?),
        (Value::Bytea(b), _) => Box::new(b.clone()),
        (Value::Text(s), _) => text_to_postgres(s, value, ty)?,
        (Value::Null, _) => Box::new(SqlNull),
    };
    Ok(out)
}

fn cell<'a, T: FromSql<'a>>(row: &'a postgres::Row, idx: usize, wrap: impl FnOnce(T) -> Value) -> Result<Value> {
    Ok(row.try_get::<_, Option<T>>(idx)?.map_or(Value::Null, wrap))
}

/// Reads one column of a result row according to its server type.
pub(crate) fn decode(row: &postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    if *ty == Type::BOOL {
        cell(row, idx, Value::Boolean)
    } else if *ty == Type::INT2 {
        cell(row, idx, |v: i16| Value::Integer(v.into()))
    } else if *ty == Type::INT4 {
        cell(row, idx, |v: i32| Value::Integer(v.into()))
    } else if *ty == Type::INT8 {
        cell(row, idx, Value::Integer)
    } else if *ty == Type::OID {
        cell(row, idx, |v: u32| Value::Integer(v.into()))
    } else if *ty == Type::FLOAT4 {
        cell(row, idx, |v: f32| Value::Real(v.into()))
    } else if *ty == Type::FLOAT8 {
        cell(row, idx, Value::Real)
    } else if *ty == Type::NUMERIC {
        cell(row, idx, Value::Numeric)
    } else if *ty == Type::DATE {
        cell(row, idx, Value::Date)
    } else if *ty == Type::TIMESTAMP {
        cell(row, idx, Value::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        cell(row, idx, Value::TimestampTz)
    } else if *ty == Type::UUID {
        cell(row, idx, Value::Uuid)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        cell(row, idx, |v: serde_json::Value| Value::Json(v.to_string()))
    } else if *ty == Type::BYTEA {
        cell(row, idx, Value::Bytea)
    } else if is_text(ty) {
        cell(row, idx, Value::Text)
    } else {
        Err(DatabaseError::Driver(format!(
            "unsupported column type {ty}; cast it to text in the query"
        )))
    }
}

fn bind(stmt: &Statement, args: &Arguments) -> Result<Vec<Param>> {
    if let Arguments::Named(pairs) = args {
        let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        return Err(DatabaseError::Driver(format!(
            "named arguments {names:?} must be compiled to numbered placeholders"
        )));
    }
    let types = stmt.params();
    let values = args.values();
    if values.len() != types.len() {
        return Err(DatabaseError::Driver(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }
    values.into_iter().zip(types).map(|(v, t)| to_postgres(v, t)).collect()
}

fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect()
}

const MANY_SAVEPOINT: &str = "sqlbridge_many";

/// Client-server session backed by the synchronous `postgres` client.
pub struct PostgresDriver {
    client: Option<Client>,
    in_transaction: bool,
}

impl PostgresDriver {
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg = postgres::Config::new();
        pg.host(config.host.as_deref().unwrap_or("127.0.0.1"));
        pg.port(config.port.unwrap_or(POSTGRES_DEFAULT_PORT));
        if let Some(user) = &config.user {
            pg.user(user.as_str());
        }
        if let Some(password) = &config.password {
            pg.password(password.as_str());
        }
        if let Some(database) = &config.database {
            pg.dbname(database.as_str());
        }
        let client = pg.connect(NoTls).map_err(DatabaseError::connection)?;
        Ok(Self {
            client: Some(client),
            in_transaction: false,
        })
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("connection is closed"))
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client()?.batch_execute("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn finish(&mut self, command: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client()?.batch_execute(command)?;
        }
        Ok(())
    }
}

impl Driver for PostgresDriver {
    fn execute(&mut self, sql: &str, args: &Arguments) -> Result<Cursor> {
        self.begin()?;
        let client = self.client()?;
        let stmt = client.prepare(sql)?;
        let params = bind(&stmt, args)?;
        let refs = as_refs(&params);

        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &refs)?;
            return Ok(Cursor::affected(affected, None));
        }

        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();
        let rows = client
            .query(&stmt, &refs)?
            .iter()
            .map(|row| {
                types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| decode(row, i, ty))
                    .collect::<Result<Row>>()
            })
            .collect::<Result<Vec<Row>>>()?;
        Ok(Cursor::with_rows(columns, rows))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Arguments]) -> Result<u64> {
        self.begin()?;
        let client = self.client()?;
        let stmt = client.prepare(sql)?;
        client.batch_execute(&format!("SAVEPOINT {MANY_SAVEPOINT}"))?;

        let mut total = 0;
        let mut failure = None;
        for args in rows {
            let outcome = bind(&stmt, args).and_then(|params| {
                client.execute(&stmt, &as_refs(&params)).map_err(DatabaseError::from)
            });
            match outcome {
                Ok(n) => total += n,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            client.batch_execute(&format!(
                "ROLLBACK TO SAVEPOINT {MANY_SAVEPOINT}; RELEASE SAVEPOINT {MANY_SAVEPOINT}"
            ))?;
            return Err(e);
        }
        client.batch_execute(&format!("RELEASE SAVEPOINT {MANY_SAVEPOINT}"))?;
        Ok(total)
    }

    fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.begin()?;
        self.client()?.batch_execute(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn is_closed(&self) -> bool {
        self.client.as_ref().is_none_or(Client::is_closed)
    }

    fn close(&mut self) -> Result<()> {
        self.in_transaction = false;
        match self.client.take() {
            Some(client) => client.close().map_err(DatabaseError::from),
            None => Ok(()),
        }
    }
}
