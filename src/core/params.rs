use super::record::Record;
use super::value::Value;

/// Parameters supplied with a script.
///
/// A batch holds one entry per row; every row is itself `Positional` or
/// `Named`, and the first row fixes the column order for the rest.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Record),
    Batch(Vec<Params>),
}

impl Params {
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(v) => v.is_empty(),
            Self::Named(r) => r.is_empty(),
            Self::Batch(rows) => rows.is_empty(),
        }
    }

    /// Number of values in a single (non-batch) set.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::None | Self::Batch(_) => 0,
            Self::Positional(v) => v.len(),
            Self::Named(r) => r.len(),
        }
    }

    /// Short rendering used in error context.
    #[must_use]
    pub fn describe(&self) -> String {
        const MAX_ROWS: usize = 3;
        match self {
            Self::Batch(rows) if rows.len() > MAX_ROWS => {
                let head: Vec<String> = rows[..MAX_ROWS].iter().map(Self::describe).collect();
                format!("[{}, ... {} rows]", head.join(", "), rows.len())
            }
            Self::Batch(rows) => {
                let all: Vec<String> = rows.iter().map(Self::describe).collect();
                format!("[{}]", all.join(", "))
            }
            Self::None => "None".to_string(),
            Self::Positional(v) => {
                let all: Vec<String> = v.iter().map(|x| format!("{x:?}")).collect();
                format!("({})", all.join(", "))
            }
            Self::Named(r) => {
                let all: Vec<String> = r.iter().map(|(k, x)| format!("{k}: {x:?}")).collect();
                format!("{{{}}}", all.join(", "))
            }
        }
    }
}

/// Values in the exact shape a driver binds them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Arguments {
    #[default]
    Empty,
    Positional(Vec<Value>),
    /// `(marker as written in the SQL, value)`, e.g. `(":id", 7)`.
    Named(Vec<(String, Value)>),
}

impl Arguments {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Positional(v) => v.len(),
            Self::Named(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in binding order.
    #[must_use]
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::Positional(v) => v.iter().collect(),
            Self::Named(v) => v.iter().map(|(_, x)| x).collect(),
        }
    }
}

/// A bare scalar is promoted to a one-element positional set.
impl From<Value> for Params {
    fn from(v: Value) -> Self {
        Self::Positional(vec![v])
    }
}

impl From<Vec<Value>> for Params {
    fn from(v: Vec<Value>) -> Self {
        Self::Positional(v)
    }
}

impl From<Record> for Params {
    fn from(r: Record) -> Self {
        Self::Named(r)
    }
}

impl From<Vec<Record>> for Params {
    fn from(rows: Vec<Record>) -> Self {
        Self::Batch(rows.into_iter().map(Self::Named).collect())
    }
}

impl From<Vec<Vec<Value>>> for Params {
    fn from(rows: Vec<Vec<Value>>) -> Self {
        Self::Batch(rows.into_iter().map(Self::Positional).collect())
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Self::None
    }
}
