// Module declarations
pub mod error;
pub mod value;
pub mod record;
pub mod params;
pub mod constraints;
pub mod column;

// Re-exports for convenience
pub use error::{DatabaseError, Result};
pub use value::Value;
pub use record::{Record, Row, get_ci, record, zip_record};
pub use params::{Arguments, Params};
pub use constraints::ForeignKey;
pub use column::ColumnSchema;
