//! # Resource Hooks
//!
//! Extension points of the five operation templates. Every method has a
//! default, so an implementation overrides only the steps it cares about.
//! Returning `Err(Interrupt::Respond(..))` ends the run with that reply and
//! rolls back pending writes; `Err(Interrupt::Fault(..))` is treated as a
//! system error.

use serde_json::{Map, Value};

use super::context::PipelineContext;
use super::errors::HookResult;
use super::filter::FilterTranslator;
use super::serializer::RecordSerializer;
use crate::storage::{Query, Record};

/// Per-resource customization of the CRUD pipeline
pub trait ResourceHooks: Send + Sync {
    // ==================
    // List
    // ==================

    /// Inspect or rewrite list arguments
    fn list_preprocess(&self, _ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        Ok(())
    }

    /// Starting query, before soft-delete and declared filters
    fn list_query(&self, ctx: &mut PipelineContext<'_>) -> HookResult<Query> {
        Ok(Query::new(ctx.model_arc()))
    }

    /// Extra predicates after the declared filter fields
    fn list_filter(&self, _ctx: &mut PipelineContext<'_>, query: Query) -> HookResult<Query> {
        Ok(query)
    }

    /// Ordering; runs after the total is counted
    fn list_sort(&self, _ctx: &mut PipelineContext<'_>, query: Query) -> HookResult<Query> {
        Ok(query.default_order())
    }

    fn list_postprocess(
        &self,
        _ctx: &mut PipelineContext<'_>,
        records: Vec<Record>,
    ) -> HookResult<Vec<Record>> {
        Ok(records)
    }

    fn list_serialize(
        &self,
        _ctx: &mut PipelineContext<'_>,
        records: &[Record],
        serializer: &RecordSerializer,
    ) -> HookResult<Value> {
        Ok(serializer.many(records)?)
    }

    /// Final shape of the `items` value
    fn list_shape(&self, _ctx: &mut PipelineContext<'_>, items: Value) -> HookResult<Value> {
        Ok(items)
    }

    // ==================
    // Uniqueness
    // ==================

    /// Live record matching the uniqueness `fields` present in the arguments.
    ///
    /// When none of the fields is present there is nothing to compare and no
    /// record is returned.
    fn find_existing(
        &self,
        ctx: &mut PipelineContext<'_>,
        fields: &[String],
    ) -> HookResult<Option<Record>> {
        let filters: Map<String, Value> = fields
            .iter()
            .filter_map(|f| ctx.args.get(f).map(|v| (f.clone(), v.clone())))
            .collect();
        if filters.is_empty() {
            return Ok(None);
        }
        Ok(FilterTranslator::new(ctx.model_arc()).first(ctx.session(), &filters)?)
    }

    // ==================
    // Create
    // ==================

    fn create_preprocess(&self, _ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        Ok(())
    }

    /// Runs after the record is flushed; its id and defaults are set
    fn create_postprocess(
        &self,
        _ctx: &mut PipelineContext<'_>,
        _record: &mut Record,
    ) -> HookResult<()> {
        Ok(())
    }

    fn create_serialize(
        &self,
        _ctx: &mut PipelineContext<'_>,
        record: &Record,
        serializer: &RecordSerializer,
    ) -> HookResult<Value> {
        Ok(serializer.one(Some(record))?)
    }

    fn create_shape(&self, _ctx: &mut PipelineContext<'_>, item: Value) -> HookResult<Value> {
        Ok(item)
    }

    /// Runs once the created record is committed. Side effects that must not
    /// outlive a rolled-back create belong here; the reply is already fixed.
    fn create_committed(&self, _ctx: &PipelineContext<'_>, _record: &Record) {}

    // ==================
    // Item lookup
    // ==================

    /// Record by primary key, used by update and delete
    fn fetch_item(&self, ctx: &mut PipelineContext<'_>, id: i64) -> HookResult<Option<Record>> {
        Ok(ctx.session().get(ctx.model(), id)?)
    }

    /// Record by primary key for item reads; defaults to [`Self::fetch_item`]
    fn read_item(&self, ctx: &mut PipelineContext<'_>, id: i64) -> HookResult<Option<Record>> {
        self.fetch_item(ctx, id)
    }

    // ==================
    // Read
    // ==================

    fn read_preprocess(&self, _ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        Ok(())
    }

    fn read_postprocess(
        &self,
        _ctx: &mut PipelineContext<'_>,
        _record: &mut Record,
    ) -> HookResult<()> {
        Ok(())
    }

    fn read_serialize(
        &self,
        _ctx: &mut PipelineContext<'_>,
        record: &Record,
        serializer: &RecordSerializer,
    ) -> HookResult<Value> {
        Ok(serializer.one(Some(record))?)
    }

    fn read_shape(&self, _ctx: &mut PipelineContext<'_>, item: Value) -> HookResult<Value> {
        Ok(item)
    }

    // ==================
    // Update
    // ==================

    /// Sees the stored record before any argument is applied
    fn update_preprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &Record) -> HookResult<()> {
        Ok(())
    }

    fn update_postprocess(
        &self,
        _ctx: &mut PipelineContext<'_>,
        _record: &mut Record,
    ) -> HookResult<()> {
        Ok(())
    }

    fn update_serialize(
        &self,
        _ctx: &mut PipelineContext<'_>,
        record: &Record,
        serializer: &RecordSerializer,
    ) -> HookResult<Value> {
        Ok(serializer.one(Some(record))?)
    }

    fn update_shape(&self, _ctx: &mut PipelineContext<'_>, item: Value) -> HookResult<Value> {
        Ok(item)
    }

    // ==================
    // Delete
    // ==================

    fn delete_preprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &Record) -> HookResult<()> {
        Ok(())
    }

    fn delete_postprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &Record) -> HookResult<()> {
        Ok(())
    }
}

/// Hook set that keeps every default
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ResourceHooks for DefaultHooks {}
