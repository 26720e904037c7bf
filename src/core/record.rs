use indexmap::IndexMap;
use super::value::Value;

/// A positional result row.
pub type Row = Vec<Value>;

/// Column name -> value, in column order.
pub type Record = IndexMap<String, Value>;

/// Builds a record from `(name, value)` pairs, keeping their order.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Looks a field up by name, falling back to an ASCII case-insensitive match.
///
/// Backends disagree on the case of unquoted aliases (`columnName` comes back
/// as `columnname` from PostgreSQL), so schema and result consumers go
/// through this instead of indexing the map directly.
pub fn get_ci<'a>(record: &'a Record, key: &str) -> Option<&'a Value> {
    record.get(key).or_else(|| {
        record
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Zips column names with a row into a record.
pub fn zip_record(columns: &[String], row: Row) -> Record {
    columns.iter().cloned().zip(row).collect()
}
