use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single scalar crossing the driver boundary, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    // Numeric types
    Integer(i64),
    Real(f64),
    Numeric(Decimal), // NUMERIC/DECIMAL as sent by the server
    // String types
    Text(String),
    // Boolean
    Boolean(bool),
    // Date/Time types
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    // Special types
    Uuid(Uuid),
    Json(String), // JSON as text
    Bytea(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            Self::Integer(i) => Some(*i as f64),
            Self::Numeric(d) => d.to_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for explicit nulls and for the sentinels tabular sources use
    /// in place of a missing cell (NaN).
    #[must_use]
    pub fn is_null_like(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Real(r) => r.is_nan(),
            _ => false,
        }
    }

    /// Replaces null-like sentinels with an explicit `Null`.
    #[must_use]
    pub fn into_explicit_null(self) -> Self {
        if self.is_null_like() { Self::Null } else { self }
    }

    /// Infers a value from free text: `null`, booleans, integers, reals,
    /// then text.
    #[must_use]
    pub fn parse_literal(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Boolean(false);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(r) = trimmed.parse::<f64>() {
            if r.is_finite() {
                return Self::Real(r);
            }
        }
        Self::Text(input.to_string())
    }

    /// Text form used for delimiter-separated export; nulls become empty.
    #[must_use]
    pub fn to_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Integer(i) => Json::from(*i),
            Self::Real(r) => serde_json::Number::from_f64(*r).map_or(Json::Null, Json::Number),
            Self::Numeric(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| Json::String(d.to_string()), Json::Number),
            Self::Boolean(b) => Json::Bool(*b),
            Self::Json(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.clone()))
            }
            other => Json::String(other.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Numeric(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::TimestampTz(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S %Z")),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::Bytea(b) => write!(f, "\\x{}", hex::encode(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Numeric(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytea(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(3.5).to_string(), "3.5");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Bytea(vec![0xde, 0xad]).to_string(), "\\xdead");
    }

    #[test]
    fn test_null_like() {
        assert!(Value::Null.is_null_like());
        assert!(Value::Real(f64::NAN).is_null_like());
        assert!(!Value::Real(0.0).is_null_like());
        assert!(!Value::Text(String::new()).is_null_like());
        assert_eq!(Value::Real(f64::NAN).into_explicit_null(), Value::Null);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("NULL"), Value::Null);
        assert_eq!(Value::parse_literal("true"), Value::Boolean(true));
        assert_eq!(Value::parse_literal("17"), Value::Integer(17));
        assert_eq!(Value::parse_literal("2.5"), Value::Real(2.5));
        assert_eq!(Value::parse_literal("A%B"), Value::Text("A%B".to_string()));
    }

    #[test]
    fn test_to_json() {
        let d = Decimal::from_str("12.50").unwrap();
        assert_eq!(Value::Numeric(d).to_json(), serde_json::json!(12.5));
        assert_eq!(Value::Json("{\"a\":1}".to_string()).to_json(), serde_json::json!({"a": 1}));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
