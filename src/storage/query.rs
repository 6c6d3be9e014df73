//! # Queries
//!
//! A query narrows one model's rows with predicates, then orders and windows
//! the result. Predicate values are coerced through the model's column types
//! at construction, so a query that builds is always well-typed.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use super::errors::StorageResult;
use super::record::Record;
use super::schema::{ModelSchema, CREATE_TIME, PRIMARY_KEY, SOFT_DELETE};
use super::value::FieldValue;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Equals
    Eq,
    /// Not equals
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
        }
    }
}

/// `field <op> value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: CmpOp,
    pub value: FieldValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: CmpOp, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Null semantics follow SQL: ordering comparisons never match a null
    /// column, `= null` means IS NULL and `!= null` means IS NOT NULL.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).unwrap_or(&FieldValue::Null);

        match self.op {
            CmpOp::Eq => actual.same_as(&self.value),
            CmpOp::Ne => {
                if self.value.is_null() {
                    !actual.is_null()
                } else {
                    !actual.is_null() && !actual.same_as(&self.value)
                }
            }
            CmpOp::Gt => actual.compare(&self.value) == Some(Ordering::Greater),
            CmpOp::Ge => matches!(
                actual.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CmpOp::Lt => actual.compare(&self.value) == Some(Ordering::Less),
            CmpOp::Le => matches!(
                actual.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Filter, order and window over one model
#[derive(Debug, Clone)]
pub struct Query {
    model: Arc<ModelSchema>,
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl Query {
    /// Unfiltered query over every row of the model
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self {
            model,
            predicates: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    pub fn model_arc(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.model)
    }

    /// Add a predicate, coercing the JSON operand to the column type
    pub fn filter(mut self, field: &str, op: CmpOp, value: &Value) -> StorageResult<Self> {
        let value = self.model.coerce(field, value)?;
        self.predicates.push(Predicate::new(field, op, value));
        Ok(self)
    }

    /// Equality shorthand
    pub fn filter_eq(self, field: &str, value: &Value) -> StorageResult<Self> {
        self.filter(field, CmpOp::Eq, value)
    }

    /// Hide soft-deleted rows when the model supports soft delete
    pub fn exclude_deleted(mut self) -> Self {
        if self.model.soft_delete() {
            self.predicates
                .push(Predicate::new(SOFT_DELETE, CmpOp::Eq, FieldValue::Int(0)));
        }
        self
    }

    /// Append a sort key
    pub fn order_by(mut self, field: &str, descending: bool) -> StorageResult<Self> {
        self.model.check_fields([field])?;
        self.order.push(OrderBy {
            field: field.to_string(),
            descending,
        });
        Ok(self)
    }

    /// Newest first by creation time, when the model tracks it. Rows created
    /// within the same second fall back to descending primary key.
    pub fn default_order(mut self) -> Self {
        if self.model.has_field(CREATE_TIME) {
            self.order.push(OrderBy {
                field: CREATE_TIME.to_string(),
                descending: true,
            });
            self.order.push(OrderBy {
                field: PRIMARY_KEY.to_string(),
                descending: true,
            });
        }
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn window(&self) -> (Option<usize>, Option<usize>) {
        (self.offset, self.limit)
    }

    /// Whether a row satisfies every predicate
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Filter, sort and window a row set. Ties keep input order.
    pub fn apply(&self, rows: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut rows: Vec<Record> = rows.into_iter().filter(|r| self.matches(r)).collect();

        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for key in &self.order {
                    let av = a.get(&key.field).unwrap_or(&FieldValue::Null);
                    let bv = b.get(&key.field).unwrap_or(&FieldValue::Null);
                    let ord = av.sort_cmp(bv);
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}
