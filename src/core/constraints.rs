use serde::{Deserialize, Serialize};

/// Target of a foreign-key column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    pub referenced_table: String,
    pub referenced_column: String,
}
