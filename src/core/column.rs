use serde::{Deserialize, Serialize};
use super::constraints::ForeignKey;

/// One column as reported by schema introspection.
///
/// Both backends produce exactly this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub table: String,
    /// `None` for no default, sequence-generated defaults and explicit nulls.
    pub default: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKey>,
}
