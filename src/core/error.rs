use std::path::PathBuf;
use thiserror::Error;

/// Prefix carried by every connection failure, followed by the driver message.
pub const CONNECTION_FAILURE_PREFIX: &str = "Database connection failed --> ";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("{}{}", CONNECTION_FAILURE_PREFIX, .0)]
    Connection(String),
    #[error("Execution failed: {source}\n  script: {script}\n  params: {params}")]
    Execution {
        script: String,
        params: String,
        #[source]
        source: Box<DatabaseError>,
    },
    #[error("Batch row {row} has {found} values, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Missing value for parameter '{0}'")]
    MissingParameter(String),
    #[error("Bulk load stopped at buffer {buffer} ({rows} rows saved to {path}): {source}")]
    BulkLoad {
        buffer: usize,
        rows: usize,
        path: PathBuf,
        #[source]
        source: Box<DatabaseError>,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Driver error: {0}")]
    Driver(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl DatabaseError {
    /// Wraps a driver-level failure raised while opening a connection.
    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    /// The innermost error, skipping execution and bulk-load context.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Execution { source, .. } | Self::BulkLoad { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
