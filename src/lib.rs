// sqlbridge - parameterized SQL over SQLite and PostgreSQL with one calling convention
// Modular architecture: text scanning -> dialect -> connection -> executor -> results

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::format_push_string)]
#![allow(clippy::wildcard_enum_match_arm)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]

// Values, parameters, records, errors, schema descriptions
pub mod core;

// Quote scanning, placeholder normalization, connection strings
pub mod parser;

// Connection configuration (file, environment, URI)
pub mod config;

// Per-backend SQL behaviour and placeholder compilation
pub mod dialect;

// Drivers and the cached connection
pub mod connection;

// Script execution, inserts, bulk loads
pub mod executor;

// Rows, records, CSV and JSON output
pub mod result;

// Re-export commonly used types for convenience
pub use crate::config::{BackendKind, ConfigOverrides, ConnectionConfig};
pub use connection::{Connector, Cursor, Driver};
pub use crate::core::{ColumnSchema, DatabaseError, ForeignKey, Params, Record, Result, Row, Value, record};
pub use dialect::Dialect;
pub use executor::{BulkLoadOptions, BulkLoader, Database, LoadProgress, RowSource, RunOptions};
pub use result::{Batches, Materialized, QueryResult, RecordResult};
