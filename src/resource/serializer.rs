//! # Record Serialization
//!
//! Renders records as JSON objects with optional field selection, timestamp
//! formatting, and JSON text decoding/encoding per field.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::{FieldValue, ModelSchema, Record, DATETIME_FORMAT, DATE_FORMAT};

/// Serialization failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SerializeError {
    /// A JSON-load field held text that is not JSON
    #[error("field '{field}' does not hold valid JSON: {message}")]
    InvalidJson { field: String, message: String },
}

/// Timestamp rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DD HH:MM:SS`
    #[default]
    DateTime,
}

impl DateFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            DateFormat::Date => DATE_FORMAT,
            DateFormat::DateTime => DATETIME_FORMAT,
        }
    }
}

/// Record to JSON converter for one model
#[derive(Debug, Clone)]
pub struct RecordSerializer {
    model: Arc<ModelSchema>,
    fields: Vec<String>,
    date_format: DateFormat,
    json_load: Vec<String>,
    json_dump: Vec<String>,
}

impl RecordSerializer {
    /// Serializer emitting every model field
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self {
            model,
            fields: Vec::new(),
            date_format: DateFormat::default(),
            json_load: Vec::new(),
            json_dump: Vec::new(),
        }
    }

    /// Restrict output to these fields, in this order
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    /// Fields whose text value is decoded as JSON
    pub fn json_load(mut self, fields: &[&str]) -> Self {
        self.json_load = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Fields whose value is encoded to a JSON string
    pub fn json_dump(mut self, fields: &[&str]) -> Self {
        self.json_dump = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Every field name this serializer is configured with
    pub fn configured_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .chain(&self.json_load)
            .chain(&self.json_dump)
            .map(String::as_str)
    }

    /// One record to an object; `None` gives `{}`
    pub fn one(&self, record: Option<&Record>) -> Result<Value, SerializeError> {
        let Some(record) = record else {
            return Ok(Value::Object(Map::new()));
        };

        let mut out = Map::new();
        if self.fields.is_empty() {
            for def in self.model.fields() {
                if let Some(value) = record.get(&def.name) {
                    out.insert(def.name.clone(), self.field_value(&def.name, value)?);
                }
            }
        } else {
            for name in &self.fields {
                if let Some(value) = record.get(name) {
                    out.insert(name.clone(), self.field_value(name, value)?);
                }
            }
        }
        Ok(Value::Object(out))
    }

    /// Records to an array, order preserved
    pub fn many(&self, records: &[Record]) -> Result<Value, SerializeError> {
        records
            .iter()
            .map(|r| self.one(Some(r)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn field_value(&self, name: &str, value: &FieldValue) -> Result<Value, SerializeError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mut current = value.clone();

        if self.json_load.iter().any(|f| f == name) {
            current = FieldValue::Json(decode_json(name, &current)?);
        }

        if self.json_dump.iter().any(|f| f == name) {
            let text = match &current {
                FieldValue::Json(v) => v.to_string(),
                other => other.to_json().to_string(),
            };
            current = FieldValue::Text(text);
        }

        Ok(match current {
            FieldValue::Timestamp(t) => Value::String(t.format(self.date_format.pattern()).to_string()),
            other => other.to_json(),
        })
    }
}

fn decode_json(field: &str, value: &FieldValue) -> Result<Value, SerializeError> {
    match value {
        FieldValue::Text(text) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        FieldValue::Text(text) => {
            serde_json::from_str(text).map_err(|e| SerializeError::InvalidJson {
                field: field.to_string(),
                message: e.to_string(),
            })
        }
        FieldValue::Json(v) => Ok(v.clone()),
        other => Ok(other.to_json()),
    }
}
