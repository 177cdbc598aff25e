//! Record identifiers: integer or text primary keys.

use crate::config::{ColumnDescriptor, ColumnType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Loose conversion at the call boundary. Anything that cannot name a
    /// row (null, booleans, arrays, objects, empty strings) gives `None`.
    pub fn from_json(v: &Value) -> Option<RecordId> {
        match v {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) if !s.trim().is_empty() => Some(RecordId::Text(s.trim().to_string())),
            _ => None,
        }
    }

    /// Reinterpret for the primary column's type. `None` when the id cannot
    /// exist in that column.
    pub fn coerce(self, column: &ColumnDescriptor) -> Option<RecordId> {
        match (column.type_, self) {
            (ty, RecordId::Int(n)) if ty.is_integer() => Some(RecordId::Int(n)),
            (ty, RecordId::Text(s)) if ty.is_integer() => s.parse().ok().map(RecordId::Int),
            (ColumnType::Uuid, RecordId::Text(s)) => uuid::Uuid::parse_str(&s).ok().map(|u| RecordId::Text(u.to_string())),
            (ColumnType::Uuid, RecordId::Int(_)) => None,
            (_, RecordId::Int(n)) => Some(RecordId::Text(n.to_string())),
            (_, text) => Some(text),
        }
    }

    /// An integer zero never names a saved row.
    pub fn is_blank(&self) -> bool {
        matches!(self, RecordId::Int(0))
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}
