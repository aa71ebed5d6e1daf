//! Row representation
//!
//! Rows are JSON objects. Reference columns hold the referenced row id as a
//! JSON number, or `null` when unset.

use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::table::Table;
use super::RowId;

/// A single row
pub type Row = Map<String, Value>;

/// Column holding the row's own id
pub const ID: &str = "id";

/// Column holding the DisableLog reference of disableable rows
pub const DISABLE_LOG: &str = "disable_log";

/// Convert a JSON object literal into a row
pub fn into_row(table: Table, value: Value) -> StoreResult<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::MalformedRow {
            table,
            reason: format!("expected object, got {}", other),
        }),
    }
}

/// Typed column accessors
pub trait RowExt {
    /// Reference column as a row id
    fn ref_id(&self, column: &str) -> Option<RowId>;

    /// String column
    fn text(&self, column: &str) -> Option<&str>;

    /// Whether the column is missing or null
    fn is_unset(&self, column: &str) -> bool;

    /// Array column of row ids
    fn id_list(&self, column: &str) -> Vec<RowId>;

    /// Array column of strings
    fn text_list(&self, column: &str) -> Vec<String>;
}

impl RowExt for Row {
    fn ref_id(&self, column: &str) -> Option<RowId> {
        self.get(column).and_then(Value::as_u64)
    }

    fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    fn is_unset(&self, column: &str) -> bool {
        self.get(column).map(Value::is_null).unwrap_or(true)
    }

    fn id_list(&self, column: &str) -> Vec<RowId> {
        self.get(column)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    }

    fn text_list(&self, column: &str) -> Vec<String> {
        self.get(column)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
