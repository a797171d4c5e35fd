//! Core value types shared by every rowsync component.

use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A row of a resource: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Identity value of a row.
///
/// Identity values are assigned by the store and never reused within a
/// resource. Serial identities are integers, generated ones are text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowKey {
    /// Integer identity (serial columns).
    Int(i64),
    /// Text identity (UUIDs and other generated values).
    Text(String),
}

impl RowKey {
    /// Extracts a key from a JSON value, if it has a usable type.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RowKey::Int),
            Value::String(s) => Some(RowKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Reads the identity column of a row.
    pub fn from_row(row: &Row, column: &str) -> Option<Self> {
        row.get(column).and_then(Self::from_value)
    }

    /// Converts the key back into a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            RowKey::Int(n) => Value::from(*n),
            RowKey::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(n) => write!(f, "{n}"),
            RowKey::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        RowKey::Int(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        RowKey::Text(value.to_string())
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        RowKey::Text(value)
    }
}

/// Identifier of a committed store transaction.
///
/// Transaction IDs are issued monotonically by the store and are the
/// handle that correlates a mutation response with its change-feed event.
/// On the wire they travel as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidTransactionId(s.to_string()))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Self(n)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
