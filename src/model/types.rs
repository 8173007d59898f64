//! Minimal SQL data type vocabulary used for `CAST` emission.
//!
//! This is deliberately small: the compiler never creates tables, so it only
//! needs enough of a type lattice to cast filter values and duration/date
//! fragments to the right target type per dialect (see
//! `sql::dialect::SqlDialect::emit_data_type`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Date,
    Timestamp,
}

impl DataType {
    /// Parse the small set of datatype names the model DSL accepts for
    /// dimension_group `datatype` and filter-value casts.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" | "yesno" => Some(DataType::Bool),
            "int" | "integer" | "number" => Some(DataType::Int),
            "float" | "double" => Some(DataType::Float),
            "decimal" | "numeric" => Some(DataType::Decimal),
            "string" | "text" | "varchar" => Some(DataType::String),
            "date" => Some(DataType::Date),
            "datetime" | "timestamp" => Some(DataType::Timestamp),
            _ => None,
        }
    }
}
