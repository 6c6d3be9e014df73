//! # In-Memory Store
//!
//! Tables live behind a single `RwLock`. Sessions stage their writes locally
//! and apply them in one write-locked pass on commit. Primary keys are
//! reserved at flush time and never handed out twice, even when the session
//! that reserved them rolls back.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::errors::{StorageError, StorageResult};
use super::query::Query;
use super::record::Record;
use super::schema::{now, ModelSchema, PRIMARY_KEY};
use super::session::{Session, Store};
use super::value::FieldValue;

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Record>,
    last_id: i64,
}

#[derive(Debug, Clone)]
enum Change {
    Upsert { table: String, record: Record },
    Remove { table: String, id: i64 },
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical row count of a table, soft-deleted rows included
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map(|t| t.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn reserve_id(&self, table: &str) -> StorageResult<i64> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let table = tables.entry(table.to_string()).or_default();
        table.last_id += 1;
        Ok(table.last_id)
    }
}

impl Store for MemoryStore {
    fn session(&self) -> Box<dyn Session + '_> {
        Box::new(MemorySession {
            store: self,
            staged: Vec::new(),
        })
    }
}

/// Unit of work against a [`MemoryStore`]
pub struct MemorySession<'a> {
    store: &'a MemoryStore,
    staged: Vec<Change>,
}

impl MemorySession<'_> {
    /// Committed rows of a table overlaid with this session's staged writes
    fn rows(&self, model: &ModelSchema) -> StorageResult<BTreeMap<i64, Record>> {
        let mut rows = {
            let tables = self.store.tables.read().map_err(|_| StorageError::LockPoisoned)?;
            tables
                .get(model.name())
                .map(|t| t.rows.clone())
                .unwrap_or_default()
        };

        for change in &self.staged {
            match change {
                Change::Upsert { table, record } if table == model.name() => {
                    if let Some(id) = record.id() {
                        rows.insert(id, record.clone());
                    }
                }
                Change::Remove { table, id } if table == model.name() => {
                    rows.remove(id);
                }
                _ => {}
            }
        }

        Ok(rows)
    }

    fn check_not_null(model: &ModelSchema, record: &Record) -> StorageResult<()> {
        for def in model.fields() {
            if def.nullable || def.name == PRIMARY_KEY {
                continue;
            }
            if record.get(&def.name).map_or(true, FieldValue::is_null) {
                return Err(StorageError::MissingField(def.name.clone()));
            }
        }
        Ok(())
    }
}

impl Session for MemorySession<'_> {
    fn first(&self, query: &Query) -> StorageResult<Option<Record>> {
        let rows = self.rows(query.model())?;
        Ok(query.apply(rows.into_values()).into_iter().next())
    }

    fn all(&self, query: &Query) -> StorageResult<Vec<Record>> {
        let rows = self.rows(query.model())?;
        Ok(query.apply(rows.into_values()))
    }

    fn count(&self, query: &Query) -> StorageResult<usize> {
        let rows = self.rows(query.model())?;
        Ok(rows.values().filter(|r| query.matches(r)).count())
    }

    fn get(&self, model: &ModelSchema, id: i64) -> StorageResult<Option<Record>> {
        Ok(self.rows(model)?.remove(&id))
    }

    fn add(&mut self, model: &ModelSchema, record: &mut Record) -> StorageResult<()> {
        for def in model.fields() {
            if record.has(&def.name) {
                continue;
            }
            if let Some(default) = &def.default {
                record.set(def.name.clone(), default.produce());
            }
        }
        Self::check_not_null(model, record)?;

        let id = self.store.reserve_id(model.name())?;
        record.set(PRIMARY_KEY, FieldValue::Int(id));

        self.staged.push(Change::Upsert {
            table: model.name().to_string(),
            record: record.clone(),
        });
        Ok(())
    }

    fn save(&mut self, model: &ModelSchema, record: &mut Record) -> StorageResult<()> {
        if record.id().is_none() {
            return Err(StorageError::MissingPrimaryKey);
        }
        for def in model.fields().iter().filter(|d| d.on_update_now) {
            record.set(def.name.clone(), FieldValue::Timestamp(now()));
        }
        Self::check_not_null(model, record)?;

        self.staged.push(Change::Upsert {
            table: model.name().to_string(),
            record: record.clone(),
        });
        Ok(())
    }

    fn remove(&mut self, model: &ModelSchema, id: i64) -> StorageResult<()> {
        self.staged.push(Change::Remove {
            table: model.name().to_string(),
            id,
        });
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let mut tables = self.store.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        for change in self.staged.drain(..) {
            match change {
                Change::Upsert { table, record } => {
                    if let Some(id) = record.id() {
                        tables.entry(table).or_default().rows.insert(id, record);
                    }
                }
                Change::Remove { table, id } => {
                    if let Some(t) = tables.get_mut(&table) {
                        t.rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.staged.clear();
    }
}
