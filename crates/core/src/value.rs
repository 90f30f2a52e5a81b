//! Storage-neutral values, rows, and row filters.
//!
//! Records expose their attributes as [`Value`]s and storage backends move
//! [`Row`]s in and out. A [`Filter`] describes which rows a bulk request
//! applies to.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Blob(Vec<u8>),
}

/// A row of named attribute values.
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for non-null values that carry content.
    ///
    /// Blank text, JSON null, and empty JSON collections count as absent.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Text(s) => !s.trim().is_empty(),
            Value::Json(serde_json::Value::Null) => false,
            Value::Json(serde_json::Value::Array(items)) => !items.is_empty(),
            Value::Json(serde_json::Value::Object(map)) => !map.is_empty(),
            Value::Blob(bytes) => !bytes.is_empty(),
            _ => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Timestamp view of the value.
    ///
    /// SQLite hands timestamps back as RFC 3339 text, so text is parsed too.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => DateTime::parse_from_rfc3339(s).ok().map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Encode the value for a column that stores serialized structures.
    pub fn to_serialized(&self) -> Result<Value, serde_json::Error> {
        let encoded = match self {
            Value::Null => return Ok(Value::Null),
            Value::Bool(b) => json!(b),
            Value::Integer(i) => json!(i),
            Value::Real(f) => json!(f),
            Value::Text(s) => json!(s),
            Value::Timestamp(ts) => json!(ts.to_rfc3339()),
            Value::Json(value) => value.clone(),
            Value::Blob(bytes) => json!(bytes),
        };
        serde_json::to_string(&encoded).map(Value::Text)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Row selection for bulk requests.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Every row of the table.
    #[default]
    All,
    /// No row at all.
    Nothing,
    /// Column equals the value. Never matches a null value.
    Eq(String, Value),
    IsNull(String),
    /// At least one of the columns is null. Matches nothing when empty.
    AnyNull(Vec<String>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Raw SQL condition, only understood by SQL backends.
    Raw(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    pub fn any_null<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() { Filter::Nothing } else { Filter::AnyNull(fields) }
    }

    /// Evaluate the filter against an in-memory row.
    ///
    /// Returns `None` for raw conditions, which cannot be evaluated here.
    pub fn matches(&self, row: &Row) -> Option<bool> {
        let get = |field: &str| row.get(field).unwrap_or(&Value::Null);
        match self {
            Filter::All => Some(true),
            Filter::Nothing => Some(false),
            Filter::Eq(field, value) => Some(!value.is_null() && get(field) == value),
            Filter::IsNull(field) => Some(get(field).is_null()),
            Filter::AnyNull(fields) => Some(fields.iter().any(|f| get(f).is_null())),
            Filter::And(filters) => {
                let mut all = true;
                for filter in filters {
                    all &= filter.matches(row)?;
                }
                Some(all)
            }
            Filter::Or(filters) => {
                let mut any = false;
                for filter in filters {
                    any |= filter.matches(row)?;
                }
                Some(any)
            }
            Filter::Raw(_) => None,
        }
    }
}
