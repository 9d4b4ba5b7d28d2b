use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Single key/value equality predicate narrowing a stream server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqFilter {
    /// Column (or key) to compare
    pub column: String,
    /// Value the column must equal
    pub value: JsonValue,
}

impl EqFilter {
    pub fn new(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for EqFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            JsonValue::String(s) => write!(f, "{}=eq.{}", self.column, s),
            other => write!(f, "{}=eq.{}", self.column, other),
        }
    }
}
