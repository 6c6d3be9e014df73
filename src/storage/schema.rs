//! # Model Schemas
//!
//! A model is a named table with typed columns. Every model carries an
//! integer primary key named `id`; [`ModelSchema::with_audit_fields`] adds the
//! shared audit columns (create/update timestamps, soft-delete flag, operator).

use chrono::{Timelike, Utc};
use serde_json::Value;

use super::errors::{StorageError, StorageResult};
use super::value::{FieldKind, FieldValue};

/// Primary key column
pub const PRIMARY_KEY: &str = "id";
/// Row creation timestamp
pub const CREATE_TIME: &str = "create_time";
/// Row modification timestamp, refreshed on every update
pub const UPDATE_TIME: &str = "update_time";
/// Soft-delete flag; 1 marks a logically deleted row
pub const SOFT_DELETE: &str = "is_delete";
/// Identity that last wrote the row
pub const OPERATOR: &str = "operator";

/// Value a column takes when a new row leaves it out
#[derive(Debug, Clone)]
pub enum FieldDefault {
    /// Fixed value
    Value(FieldValue),
    /// Current UTC time, truncated to whole seconds
    Now,
    /// Fresh v4 UUID in hyphenated form
    Uuid,
    /// Computed per row
    Generated(fn() -> FieldValue),
}

impl FieldDefault {
    pub fn produce(&self) -> FieldValue {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Now => FieldValue::Timestamp(now()),
            FieldDefault::Uuid => FieldValue::Text(uuid::Uuid::new_v4().to_string()),
            FieldDefault::Generated(f) => f(),
        }
    }
}

/// Current UTC time at second precision
pub fn now() -> chrono::NaiveDateTime {
    let t = Utc::now().naive_utc();
    t.with_nanosecond(0).unwrap_or(t)
}

/// Column definition
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Whether the column accepts null
    pub nullable: bool,
    pub default: Option<FieldDefault>,
    /// Column is set to the current time whenever the row is updated
    pub on_update_now: bool,
}

impl FieldDef {
    /// Nullable column without a default
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            default: None,
            on_update_now: false,
        }
    }

    /// Create a required text column
    pub fn required_text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text).not_null()
    }

    /// Create an optional text column
    pub fn optional_text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Create a required integer column
    pub fn required_int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer).not_null()
    }

    /// Create an optional integer column
    pub fn optional_int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Create an optional JSON column
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// Create an optional timestamp column
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: FieldValue) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(FieldDefault::Now);
        self
    }

    pub fn default_uuid(mut self) -> Self {
        self.default = Some(FieldDefault::Uuid);
        self
    }

    pub fn default_with(mut self, f: fn() -> FieldValue) -> Self {
        self.default = Some(FieldDefault::Generated(f));
        self
    }

    pub fn on_update_now(mut self) -> Self {
        self.on_update_now = true;
        self
    }
}

/// Named table definition
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    fields: Vec<FieldDef>,
}

impl ModelSchema {
    /// New model with only the primary key column
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldDef::required_int(PRIMARY_KEY)],
        }
    }

    /// Add a column, replacing any existing column of the same name
    pub fn field(mut self, def: FieldDef) -> Self {
        match self.fields.iter_mut().find(|f| f.name == def.name) {
            Some(existing) => *existing = def,
            None => self.fields.push(def),
        }
        self
    }

    /// Add the shared audit columns
    pub fn with_audit_fields(self) -> Self {
        self.field(FieldDef::timestamp(CREATE_TIME).default_now())
            .field(FieldDef::timestamp(UPDATE_TIME).default_now().on_update_now())
            .field(
                FieldDef::required_int(SOFT_DELETE).default_value(FieldValue::Int(0)),
            )
            .field(FieldDef::optional_text(OPERATOR))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_def(name).is_some()
    }

    /// Whether deletes flip the soft-delete flag instead of removing rows
    pub fn soft_delete(&self) -> bool {
        self.has_field(SOFT_DELETE)
    }

    /// Coerce a JSON value for the named column
    pub fn coerce(&self, field: &str, value: &Value) -> StorageResult<FieldValue> {
        let def = self.field_def(field).ok_or_else(|| self.unknown(field))?;
        FieldValue::coerce(def.kind, value)
    }

    /// Fail unless every listed name is a declared column
    pub fn check_fields<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> StorageResult<()> {
        for name in names {
            if !self.has_field(name) {
                return Err(self.unknown(name));
            }
        }
        Ok(())
    }

    fn unknown(&self, field: &str) -> StorageError {
        StorageError::UnknownField {
            model: self.name.clone(),
            field: field.to_string(),
        }
    }
}
