//! # Filter Translation
//!
//! Turns a filter mapping into a [`Query`]. Each entry is either a literal
//! (equality) or a directive object such as `{"gt": 5}`. Only one directive
//! per field is honored, looked up in the order gt, lt, ge, le, ne; a
//! directive object with none of those keys adds no predicate.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::storage::{CmpOp, ModelSchema, Query, Record, Session, StorageResult};

/// Directive keys in lookup order
pub const DIRECTIVES: [(&str, CmpOp); 5] = [
    ("gt", CmpOp::Gt),
    ("lt", CmpOp::Lt),
    ("ge", CmpOp::Ge),
    ("le", CmpOp::Le),
    ("ne", CmpOp::Ne),
];

/// How one filter entry reads
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm<'a> {
    Equals(&'a Value),
    Compare(CmpOp, &'a Value),
    Ignored,
}

impl<'a> FilterTerm<'a> {
    pub fn parse(value: &'a Value) -> Self {
        match value {
            Value::Object(directive) => DIRECTIVES
                .iter()
                .find_map(|(key, op)| directive.get(*key).map(|v| FilterTerm::Compare(*op, v)))
                .unwrap_or(FilterTerm::Ignored),
            other => FilterTerm::Equals(other),
        }
    }
}

/// Conjoin every entry of `filters` onto `query`
pub fn apply_filters(mut query: Query, filters: &Map<String, Value>) -> StorageResult<Query> {
    for (field, value) in filters {
        query = match FilterTerm::parse(value) {
            FilterTerm::Equals(v) => query.filter(field, CmpOp::Eq, v)?,
            FilterTerm::Compare(op, v) => query.filter(field, op, v)?,
            FilterTerm::Ignored => query,
        };
    }
    Ok(query)
}

/// Filter lookups over one model, soft-deleted rows hidden
#[derive(Debug, Clone)]
pub struct FilterTranslator {
    model: Arc<ModelSchema>,
}

impl FilterTranslator {
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self { model }
    }

    /// Query selecting live rows that satisfy every filter
    pub fn query(&self, filters: &Map<String, Value>) -> StorageResult<Query> {
        let base = Query::new(Arc::clone(&self.model)).exclude_deleted();
        apply_filters(base, filters)
    }

    pub fn first(
        &self,
        session: &dyn Session,
        filters: &Map<String, Value>,
    ) -> StorageResult<Option<Record>> {
        session.first(&self.query(filters)?)
    }

    pub fn all(&self, session: &dyn Session, filters: &Map<String, Value>) -> StorageResult<Vec<Record>> {
        session.all(&self.query(filters)?)
    }

    pub fn count(&self, session: &dyn Session, filters: &Map<String, Value>) -> StorageResult<usize> {
        session.count(&self.query(filters)?)
    }
}
