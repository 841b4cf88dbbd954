//! Column types and bound values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive column types a schema may declare.
///
/// The set is deliberately small: it covers what the storefront catalog
/// needs and maps cleanly onto both Postgres and SQLite storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Auto-generated 64-bit integer key.
    Serial,
    /// 64-bit integer.
    BigInt,
    /// 32-bit integer.
    Integer,
    /// Double precision floating point.
    Float,
    /// Variable length text.
    Text,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone, normalised to UTC.
    Timestamp,
    /// Structured JSON document.
    Json,
}

impl ColumnType {
    /// Returns the lowercase name used in schema files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::BigInt => "bigint",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }

    /// Whether values of this type are integers.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Serial | Self::BigInt | Self::Integer)
    }

    /// Whether a foreign key column of this type may reference a column of
    /// type `target`.
    ///
    /// Integer types reference each other freely; everything else must match
    /// exactly.
    pub fn can_reference(self, target: ColumnType) -> bool {
        (self.is_integer() && target.is_integer()) || self == target
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single bound parameter or column default.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer width.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Whether this value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
        }
    }

    /// Whether this value can be stored in a column of type `ty`.
    ///
    /// `NULL` fits every type; nullability is checked separately against
    /// the column declaration. Integers widen into float columns.
    pub fn fits(&self, ty: ColumnType) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(_) => ty == ColumnType::Boolean,
            Self::Int(_) => ty.is_integer() || ty == ColumnType::Float,
            Self::Float(v) => ty == ColumnType::Float && v.is_finite(),
            Self::Text(_) => ty == ColumnType::Text,
            Self::Timestamp(_) => ty == ColumnType::Timestamp,
            Self::Json(_) => ty == ColumnType::Json,
        }
    }

    /// Text-protocol form of the value, as sent to a remote SQL endpoint.
    ///
    /// Every non-null value travels as a string and is cast by the server
    /// according to the parameter's inferred type.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Text(v) => Some(v.clone()),
            Self::Timestamp(v) => Some(v.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Text-protocol form as a JSON value (`null` or a string).
    pub fn to_param(&self) -> serde_json::Value {
        match self.to_text() {
            Some(text) => serde_json::Value::String(text),
            None => serde_json::Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
