//! # Field Values
//!
//! Typed column values and their coercion from JSON input.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::errors::{StorageError, StorageResult};

/// Canonical text form of timestamps
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical text form of dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column types a model can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Bool,
    Timestamp,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Bool => "bool",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Json => "json",
        }
    }
}

/// A stored column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Json(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Coerce a JSON value into the representation for `kind`.
    ///
    /// JSON null always becomes [`FieldValue::Null`]; nullability is checked
    /// when a record is written, not here.
    pub fn coerce(kind: FieldKind, value: &Value) -> StorageResult<Self> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }

        let coerced = match kind {
            FieldKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(FieldValue::Int),
                Value::Bool(b) => Some(FieldValue::Int(i64::from(*b))),
                Value::String(s) => s.trim().parse::<i64>().ok().map(FieldValue::Int),
                _ => None,
            },
            FieldKind::Float => match value {
                Value::Number(n) => n.as_f64().map(FieldValue::Float),
                Value::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Float),
                _ => None,
            },
            FieldKind::Text => match value {
                Value::String(s) => Some(FieldValue::Text(s.clone())),
                Value::Number(_) | Value::Bool(_) => Some(FieldValue::Text(value.to_string())),
                _ => None,
            },
            FieldKind::Bool => match value {
                Value::Bool(b) => Some(FieldValue::Bool(*b)),
                Value::Number(n) => n.as_i64().map(|i| FieldValue::Bool(i != 0)),
                Value::String(s) => parse_bool(s).map(FieldValue::Bool),
                _ => None,
            },
            FieldKind::Timestamp => match value {
                Value::String(s) => parse_timestamp(s).map(FieldValue::Timestamp),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|dt| FieldValue::Timestamp(dt.naive_utc())),
                _ => None,
            },
            FieldKind::Json => Some(FieldValue::Json(value.clone())),
        };

        coerced.ok_or_else(|| StorageError::TypeMismatch {
            kind: kind.as_str(),
            value: value.to_string(),
        })
    }

    /// JSON rendering; timestamps use [`DATETIME_FORMAT`]
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(t) => Value::String(t.format(DATETIME_FORMAT).to_string()),
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// Ordering between comparable values, `None` across incompatible types
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality as a storage engine sees it (numeric kinds compare by value)
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Null, _) | (_, FieldValue::Null) => false,
            (FieldValue::Json(a), FieldValue::Json(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Total order for sorting; nulls sort first
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Null, _) => Ordering::Less,
            (_, FieldValue::Null) => Ordering::Greater,
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

/// Parse the usual textual spellings of a boolean
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// Parse a timestamp in canonical, ISO-8601 or date-only form
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
