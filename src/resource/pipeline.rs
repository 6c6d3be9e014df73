//! # CRUD Pipeline
//!
//! [`CrudResource`] binds a model to argument specs, a serializer and a hook
//! set, and runs the five operation templates (list, create, read, update,
//! delete) against a [`Store`].
//!
//! Each run opens one session. Writes commit only at the end of a successful
//! run; any interrupt or fault rolls them back. Argument errors are returned
//! as `Err(ArgError)` for the transport to render. Every other outcome,
//! including system faults, is a [`Reply`].

use std::fmt;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use super::args::{paging_specs, parse_args, ArgError, Args, ArgumentSpec, RequestParams};
use super::context::{PipelineContext, RequestScope};
use super::envelope::{messages, Reply};
use super::errors::{error_chain, HookResult, Interrupt, ResourceError, ResourceResult};
use super::filter::apply_filters;
use super::hooks::{DefaultHooks, ResourceHooks};
use super::serializer::{DateFormat, RecordSerializer};
use crate::storage::{FieldValue, ModelSchema, Query, Record, Store, PRIMARY_KEY, SOFT_DELETE};

/// Outcome of one pipeline entry point
pub type PipelineResult = Result<Reply, ArgError>;

/// The five operations a resource can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    /// HTTP verb the operation is mounted under
    pub fn method(&self) -> Method {
        match self {
            Operation::List | Operation::Read => Method::GET,
            Operation::Create => Method::POST,
            Operation::Update => Method::PUT,
            Operation::Delete => Method::DELETE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether the operation writes through its session
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }

    fn success_message(&self) -> &'static str {
        match self {
            Operation::List | Operation::Read => messages::OK,
            Operation::Create => messages::CREATE_OK,
            Operation::Update => messages::UPDATE_OK,
            Operation::Delete => messages::DELETE_OK,
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Operation::List | Operation::Read => messages::QUERY_FAILED,
            Operation::Create => messages::CREATE_FAILED,
            Operation::Update => messages::UPDATE_FAILED,
            Operation::Delete => messages::DELETE_FAILED,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Operation::List => 1,
            Operation::Create => 1 << 1,
            Operation::Read => 1 << 2,
            Operation::Update => 1 << 3,
            Operation::Delete => 1 << 4,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of enabled operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operations(u8);

impl Operations {
    pub fn none() -> Self {
        Operations(0)
    }

    pub fn all() -> Self {
        Operation::ALL.iter().copied().collect()
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn insert(&mut self, op: Operation) {
        self.0 |= op.bit();
    }
}

impl FromIterator<Operation> for Operations {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut ops = Operations::none();
        for op in iter {
            ops.insert(op);
        }
        ops
    }
}

/// Reply for a verb the resource does not enable
pub fn method_not_allowed(request_id: &str, method: &Method) -> Reply {
    Reply::failed(request_id, format!("{} method is not allowed", method))
        .with_status(StatusCode::NOT_FOUND)
}

#[derive(Debug, Clone, Default)]
struct OperationArgs {
    list: Vec<ArgumentSpec>,
    create: Vec<ArgumentSpec>,
    read: Vec<ArgumentSpec>,
    update: Vec<ArgumentSpec>,
    delete: Vec<ArgumentSpec>,
}

impl OperationArgs {
    fn for_op(&self, op: Operation) -> &[ArgumentSpec] {
        match op {
            Operation::List => &self.list,
            Operation::Create => &self.create,
            Operation::Read => &self.read,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}

/// A model exposed through the CRUD pipeline
pub struct CrudResource {
    name: String,
    model: Arc<ModelSchema>,
    operations: Operations,
    args: OperationArgs,
    serializer: RecordSerializer,
    create_unique: Vec<String>,
    update_unique: Vec<String>,
    updatable: Vec<String>,
    filter_fields: Vec<String>,
    auth_required: bool,
    hooks: Arc<dyn ResourceHooks>,
}

impl fmt::Debug for CrudResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudResource")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("operations", &self.operations)
            .field("auth_required", &self.auth_required)
            .finish()
    }
}

impl CrudResource {
    /// Start declaring a resource over `model`
    pub fn builder(name: impl Into<String>, model: Arc<ModelSchema>) -> CrudResourceBuilder {
        CrudResourceBuilder::new(name, model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    pub fn operations(&self) -> Operations {
        self.operations
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    // ==================
    // Entry points
    // ==================

    /// Paginated, filtered list: `{total, items}`
    pub fn list(&self, store: &dyn Store, scope: RequestScope, params: &RequestParams) -> PipelineResult {
        self.run(Operation::List, store, scope, params, |this, ctx| this.run_list(ctx))
    }

    /// Create one record: `{item}`
    pub fn create(&self, store: &dyn Store, scope: RequestScope, params: &RequestParams) -> PipelineResult {
        self.run(Operation::Create, store, scope, params, |this, ctx| this.run_create(ctx))
    }

    /// Read one record: `{key, item}`
    pub fn read(
        &self,
        store: &dyn Store,
        scope: RequestScope,
        id: &str,
        params: &RequestParams,
    ) -> PipelineResult {
        self.run(Operation::Read, store, scope, params, |this, ctx| this.run_read(ctx, id))
    }

    /// Update one record: `{key, item}`
    pub fn update(
        &self,
        store: &dyn Store,
        scope: RequestScope,
        id: &str,
        params: &RequestParams,
    ) -> PipelineResult {
        self.run(Operation::Update, store, scope, params, |this, ctx| this.run_update(ctx, id))
    }

    /// Delete one record: `{key}`
    pub fn delete(
        &self,
        store: &dyn Store,
        scope: RequestScope,
        id: &str,
        params: &RequestParams,
    ) -> PipelineResult {
        self.run(Operation::Delete, store, scope, params, |this, ctx| this.run_delete(ctx, id))
    }

    /// Gate, parse, open a session, run the template, settle the session
    fn run<F>(
        &self,
        op: Operation,
        store: &dyn Store,
        scope: RequestScope,
        params: &RequestParams,
        body: F,
    ) -> PipelineResult
    where
        F: FnOnce(&Self, &mut PipelineContext<'_>) -> HookResult<Value>,
    {
        if !self.operations.contains(op) {
            return Ok(method_not_allowed(&scope.request_id, &op.method()));
        }

        let args = parse_args(self.args.for_op(op), params)?;

        if matches!(op, Operation::Create | Operation::Update) && args.is_empty() {
            return Ok(Reply::failed(&scope.request_id, messages::PARAMS_REQUIRED)
                .with_status(StatusCode::BAD_REQUEST));
        }

        let mut session = store.session();
        let mut ctx = PipelineContext::new(scope, op, Arc::clone(&self.model), args, session.as_mut());

        let outcome = body(self, &mut ctx);
        let outcome = match outcome {
            Ok(data) if op.is_write() => ctx.session_mut().commit().map(|_| data).map_err(Interrupt::from),
            other => other,
        };

        if outcome.is_ok() {
            if let Some(record) = ctx.created.take() {
                self.hooks.create_committed(&ctx, &record);
            }
        }

        let reply = match outcome {
            Ok(data) => Reply::ok(ctx.request_id(), op.success_message(), data),
            Err(Interrupt::Respond(reply)) => {
                ctx.session_mut().rollback();
                debug!(
                    request_id = %ctx.request_id(),
                    resource = %self.name,
                    operation = %op,
                    reply = %reply.envelope().message(),
                    "Operation ended early"
                );
                reply
            }
            Err(Interrupt::Fault(err)) => {
                ctx.session_mut().rollback();
                error!(
                    request_id = %ctx.request_id(),
                    resource = %self.name,
                    model = %self.model.name(),
                    operation = %op,
                    error = %error_chain(&err),
                    "Operation failed"
                );
                Reply::failed(ctx.request_id(), op.failure_message())
            }
        };
        Ok(reply)
    }

    // ==================
    // Templates
    // ==================

    fn run_list(&self, ctx: &mut PipelineContext<'_>) -> HookResult<Value> {
        self.hooks.list_preprocess(ctx)?;

        let query = self.hooks.list_query(ctx)?.exclude_deleted();
        let declared = pick(&ctx.args, &self.filter_fields);
        let query = apply_filters(query, &declared)?;
        let query = self.hooks.list_filter(ctx, query)?;

        let total = ctx.session().count(&query)?;
        ctx.total = Some(total);

        let query = self.hooks.list_sort(ctx, query)?;
        let query = paginate(query, &ctx.args);

        let records = ctx.session().all(&query)?;
        let records = self.hooks.list_postprocess(ctx, records)?;
        let items = self.hooks.list_serialize(ctx, &records, &self.serializer)?;
        let items = self.hooks.list_shape(ctx, items)?;

        Ok(json!({ "total": total, "items": items }))
    }

    fn run_create(&self, ctx: &mut PipelineContext<'_>) -> HookResult<Value> {
        if !self.create_unique.is_empty()
            && self.hooks.find_existing(ctx, &self.create_unique)?.is_some()
        {
            return Err(ctx.fail(messages::ALREADY_EXISTS));
        }

        self.hooks.create_preprocess(ctx)?;

        let mut record = Record::from_args(&self.model, &ctx.args)?;
        ctx.session_mut().add(&self.model, &mut record)?;

        let flushed = record.clone();
        self.hooks.create_postprocess(ctx, &mut record)?;
        if record != flushed {
            ctx.session_mut().save(&self.model, &mut record)?;
        }

        let item = self.hooks.create_serialize(ctx, &record, &self.serializer)?;
        let item = self.hooks.create_shape(ctx, item)?;
        ctx.created = Some(record);
        Ok(json!({ "item": item }))
    }

    fn run_read(&self, ctx: &mut PipelineContext<'_>, id: &str) -> HookResult<Value> {
        self.hooks.read_preprocess(ctx)?;

        let (key, mut record) = self.load(ctx, id, Operation::Read)?;
        self.hooks.read_postprocess(ctx, &mut record)?;
        let item = self.hooks.read_serialize(ctx, &record, &self.serializer)?;
        let item = self.hooks.read_shape(ctx, item)?;

        Ok(json!({ "key": key, "item": item }))
    }

    fn run_update(&self, ctx: &mut PipelineContext<'_>, id: &str) -> HookResult<Value> {
        let (key, mut record) = self.load(ctx, id, Operation::Update)?;

        self.hooks.update_preprocess(ctx, &record)?;

        if !self.update_unique.is_empty() {
            if let Some(existing) = self.hooks.find_existing(ctx, &self.update_unique)? {
                if existing.id() != record.id() {
                    return Err(ctx.fail(messages::DUPLICATE));
                }
            }
        }

        for (field, value) in &ctx.args {
            if self.updatable.iter().any(|f| f == field) {
                record.set(field.clone(), self.model.coerce(field, value)?);
            }
        }

        self.hooks.update_postprocess(ctx, &mut record)?;
        ctx.session_mut().save(&self.model, &mut record)?;

        let item = self.hooks.update_serialize(ctx, &record, &self.serializer)?;
        let item = self.hooks.update_shape(ctx, item)?;

        Ok(json!({ "key": key, "item": item }))
    }

    fn run_delete(&self, ctx: &mut PipelineContext<'_>, id: &str) -> HookResult<Value> {
        let (key, mut record) = self.load(ctx, id, Operation::Delete)?;

        self.hooks.delete_preprocess(ctx, &record)?;

        if self.model.soft_delete() {
            record.set(SOFT_DELETE, FieldValue::Int(1));
            ctx.session_mut().save(&self.model, &mut record)?;
        } else {
            ctx.session_mut().remove(&self.model, key)?;
        }

        self.hooks.delete_postprocess(ctx, &record)?;

        Ok(json!({ "key": key }))
    }

    /// Live record for an item operation, or a "record not found" interrupt
    fn load(&self, ctx: &mut PipelineContext<'_>, id: &str, op: Operation) -> HookResult<(i64, Record)> {
        let Ok(key) = id.trim().parse::<i64>() else {
            return Err(ctx.fail(messages::NOT_FOUND));
        };

        let found = match op {
            Operation::Read => self.hooks.read_item(ctx, key)?,
            _ => self.hooks.fetch_item(ctx, key)?,
        };

        match found {
            Some(record) if !record.is_soft_deleted() => Ok((key, record)),
            _ => Err(ctx.fail(messages::NOT_FOUND)),
        }
    }
}

/// Subset of `args` named by `fields`
fn pick(args: &Args, fields: &[String]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|f| args.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

/// Apply `start`/`number`, else `page`/`per_page`
fn paginate(query: Query, args: &Args) -> Query {
    let int = |key: &str| args.get(key).and_then(Value::as_i64);

    if let (Some(start), Some(number)) = (int("start"), int("number")) {
        return query.offset(start.max(0) as usize).limit(number.max(0) as usize);
    }

    if let (Some(page), Some(per_page)) = (int("page"), int("per_page")) {
        let per_page = per_page.max(0) as usize;
        let page = page.max(1) as usize;
        return query
            .offset(per_page.saturating_mul(page - 1))
            .limit(per_page);
    }

    query
}

/// Declarative construction of a [`CrudResource`]
pub struct CrudResourceBuilder {
    name: String,
    model: Arc<ModelSchema>,
    operations: Operations,
    args: OperationArgs,
    get_fields: Vec<String>,
    date_format: DateFormat,
    json_load: Vec<String>,
    json_dump: Vec<String>,
    create_unique: Vec<String>,
    update_unique: Vec<String>,
    updatable: Vec<String>,
    filter_fields: Vec<String>,
    auth_required: bool,
    hooks: Arc<dyn ResourceHooks>,
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl CrudResourceBuilder {
    fn new(name: impl Into<String>, model: Arc<ModelSchema>) -> Self {
        Self {
            name: name.into(),
            model,
            operations: Operations::all(),
            args: OperationArgs::default(),
            get_fields: Vec::new(),
            date_format: DateFormat::default(),
            json_load: Vec::new(),
            json_dump: Vec::new(),
            create_unique: Vec::new(),
            update_unique: Vec::new(),
            updatable: Vec::new(),
            filter_fields: Vec::new(),
            auth_required: false,
            hooks: Arc::new(DefaultHooks),
        }
    }

    /// Enable only these operations (all five by default)
    pub fn operations(mut self, ops: &[Operation]) -> Self {
        self.operations = ops.iter().copied().collect();
        self
    }

    pub fn list_args(mut self, specs: Vec<ArgumentSpec>) -> Self {
        self.args.list = specs;
        self
    }

    pub fn create_args(mut self, specs: Vec<ArgumentSpec>) -> Self {
        self.args.create = specs;
        self
    }

    pub fn read_args(mut self, specs: Vec<ArgumentSpec>) -> Self {
        self.args.read = specs;
        self
    }

    pub fn update_args(mut self, specs: Vec<ArgumentSpec>) -> Self {
        self.args.update = specs;
        self
    }

    pub fn delete_args(mut self, specs: Vec<ArgumentSpec>) -> Self {
        self.args.delete = specs;
        self
    }

    /// Fields emitted by the serializer (all model fields when empty)
    pub fn get_fields(mut self, fields: &[&str]) -> Self {
        self.get_fields = owned(fields);
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    pub fn json_load(mut self, fields: &[&str]) -> Self {
        self.json_load = owned(fields);
        self
    }

    pub fn json_dump(mut self, fields: &[&str]) -> Self {
        self.json_dump = owned(fields);
        self
    }

    /// Fields checked for an existing record before create
    pub fn create_unique(mut self, fields: &[&str]) -> Self {
        self.create_unique = owned(fields);
        self
    }

    /// Fields checked for a conflicting record before update
    pub fn update_unique(mut self, fields: &[&str]) -> Self {
        self.update_unique = owned(fields);
        self
    }

    /// Fields an update may assign. Left empty, every column except the
    /// primary key is assignable.
    pub fn updatable(mut self, fields: &[&str]) -> Self {
        self.updatable = owned(fields);
        self
    }

    /// List arguments applied as equality or directive filters
    pub fn filter_fields(mut self, fields: &[&str]) -> Self {
        self.filter_fields = owned(fields);
        self
    }

    /// Require a valid bearer token on every route of this resource
    pub fn require_auth(mut self) -> Self {
        self.auth_required = true;
        self
    }

    pub fn hooks(mut self, hooks: impl ResourceHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Validate every declared field against the model
    pub fn build(self) -> ResourceResult<CrudResource> {
        let declared = self
            .get_fields
            .iter()
            .chain(&self.json_load)
            .chain(&self.json_dump)
            .chain(&self.create_unique)
            .chain(&self.update_unique)
            .chain(&self.updatable)
            .chain(&self.filter_fields);

        for field in declared {
            if !self.model.has_field(field) {
                return Err(ResourceError::Config(format!(
                    "resource '{}' names field '{}' which model '{}' does not declare",
                    self.name,
                    field,
                    self.model.name()
                )));
            }
        }

        let serializer = RecordSerializer::new(Arc::clone(&self.model))
            .fields(&as_strs(&self.get_fields))
            .date_format(self.date_format)
            .json_load(&as_strs(&self.json_load))
            .json_dump(&as_strs(&self.json_dump));

        let updatable = if self.updatable.is_empty() {
            self.model
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .filter(|name| name != PRIMARY_KEY)
                .collect()
        } else {
            self.updatable
        };

        let mut args = self.args;
        let paging = paging_specs();
        args.list.retain(|s| !paging.iter().any(|p| p.name == s.name));
        args.list.extend(paging);

        Ok(CrudResource {
            name: self.name,
            model: self.model,
            operations: self.operations,
            args,
            serializer,
            create_unique: self.create_unique,
            update_unique: self.update_unique,
            updatable,
            filter_fields: self.filter_fields,
            auth_required: self.auth_required,
            hooks: self.hooks,
        })
    }
}

fn as_strs(fields: &[String]) -> Vec<&str> {
    fields.iter().map(String::as_str).collect()
}
