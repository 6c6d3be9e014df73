//! # Store and Session
//!
//! A [`Store`] hands out [`Session`]s. A session is a unit of work: writes are
//! staged, visible to reads made through the same session, and become
//! durable only on [`Session::commit`]. Dropping a session without committing
//! discards its staged writes.

use super::errors::StorageResult;
use super::query::Query;
use super::record::Record;
use super::schema::ModelSchema;

/// Source of sessions
pub trait Store: Send + Sync {
    /// Open a fresh unit of work
    fn session(&self) -> Box<dyn Session + '_>;
}

/// Unit of work over a store
pub trait Session {
    /// First row matching the query, in query order
    fn first(&self, query: &Query) -> StorageResult<Option<Record>>;

    /// Every row matching the query, ordered and windowed
    fn all(&self, query: &Query) -> StorageResult<Vec<Record>>;

    /// Number of rows matching the query's predicates, ignoring its window
    fn count(&self, query: &Query) -> StorageResult<usize>;

    /// Row by primary key, soft-deleted rows included
    fn get(&self, model: &ModelSchema, id: i64) -> StorageResult<Option<Record>>;

    /// Stage a new row and flush it.
    ///
    /// Column defaults are filled and the generated primary key is written
    /// into `record` before this returns.
    fn add(&mut self, model: &ModelSchema, record: &mut Record) -> StorageResult<()>;

    /// Stage changes to an existing row. Columns marked update-on-write are
    /// refreshed in `record`.
    fn save(&mut self, model: &ModelSchema, record: &mut Record) -> StorageResult<()>;

    /// Stage physical removal of a row
    fn remove(&mut self, model: &ModelSchema, id: i64) -> StorageResult<()>;

    /// Make every staged change durable
    fn commit(&mut self) -> StorageResult<()>;

    /// Discard every staged change
    fn rollback(&mut self);
}
