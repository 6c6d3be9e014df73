//! # Records
//!
//! A record is one row of a model: column name to typed value.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::errors::StorageResult;
use super::schema::{ModelSchema, PRIMARY_KEY, SOFT_DELETE};
use super::value::FieldValue;

/// One row of a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new row from request arguments.
    ///
    /// Only keys naming a declared column are taken. Null values and the
    /// primary key are skipped so that column defaults and generated ids apply.
    pub fn from_args(model: &ModelSchema, args: &Map<String, Value>) -> StorageResult<Self> {
        let mut record = Record::new();
        for (key, value) in args {
            if key == PRIMARY_KEY || value.is_null() || !model.has_field(key) {
                continue;
            }
            record.set(key, model.coerce(key, value)?);
        }
        Ok(record)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.values.insert(field.into(), value);
    }

    pub fn has(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.values.remove(field)
    }

    /// Primary key, if assigned
    pub fn id(&self) -> Option<i64> {
        match self.values.get(PRIMARY_KEY) {
            Some(FieldValue::Int(id)) => Some(*id),
            _ => None,
        }
    }

    /// Whether the soft-delete flag is set
    pub fn is_soft_deleted(&self) -> bool {
        match self.values.get(SOFT_DELETE) {
            Some(FieldValue::Int(flag)) => *flag != 0,
            Some(FieldValue::Bool(flag)) => *flag,
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }
}
