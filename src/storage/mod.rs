//! Storage subsystem for restbase
//!
//! Models, typed records, queries and transactional sessions. The resource
//! pipeline talks to storage only through the [`Store`] and [`Session`]
//! traits; [`MemoryStore`] is the bundled backend.

mod errors;
mod memory;
mod query;
mod record;
mod schema;
mod session;
pub mod value;

pub use errors::{StorageError, StorageResult};
pub use memory::{MemorySession, MemoryStore};
pub use query::{CmpOp, OrderBy, Predicate, Query};
pub use record::Record;
pub use schema::{
    FieldDef, FieldDefault, ModelSchema, CREATE_TIME, OPERATOR, PRIMARY_KEY, SOFT_DELETE,
    UPDATE_TIME,
};
pub use session::{Session, Store};
pub use value::{FieldKind, FieldValue, DATETIME_FORMAT, DATE_FORMAT};
