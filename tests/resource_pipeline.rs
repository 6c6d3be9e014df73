//! Resource Pipeline Tests
//!
//! Drives `CrudResource` directly against a `MemoryStore`:
//! - list totals are counted before pagination
//! - uniqueness checks leave a single row
//! - update applies present, whitelisted fields only
//! - soft-deleted rows vanish from every public operation
//! - any fault during a write leaves storage untouched
//! - read and list faults surface as the generic query failure
//! - the commit hook only sees records that were committed

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use restbase::resource::{
    messages, ArgError, ArgType, ArgumentSpec, CrudResource, HookResult, Interrupt,
    PipelineContext, Reply, RequestParams, RequestScope, ResourceError, ResourceHooks,
    FAILED_CODE, SUCCESS_CODE,
};
use restbase::storage::{
    FieldDef, FieldValue, MemoryStore, ModelSchema, Record, Session, Store,
};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

const TABLE: &str = "t_article";

fn article_model() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::new(TABLE)
            .field(FieldDef::required_text("title"))
            .field(FieldDef::optional_int("score"))
            .field(FieldDef::optional_text("body"))
            .field(FieldDef::json("meta"))
            .with_audit_fields(),
    )
}

fn write_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::json_str("title"),
        ArgumentSpec::json_str("score").kind(ArgType::Int),
        ArgumentSpec::json_str("body"),
        ArgumentSpec::json_str("meta").kind(ArgType::Json),
        ArgumentSpec::json_str("operator"),
    ]
}

fn articles_with(hooks: impl ResourceHooks + 'static) -> CrudResource {
    CrudResource::builder("articles", article_model())
        .list_args(vec![
            ArgumentSpec::new("title"),
            ArgumentSpec::new("score").kind(ArgType::Json),
        ])
        .create_args(vec![
            ArgumentSpec::json_str("title").required(),
            ArgumentSpec::json_str("score").kind(ArgType::Int),
            ArgumentSpec::json_str("body"),
            ArgumentSpec::json_str("meta").kind(ArgType::Json),
        ])
        .update_args(write_args())
        .get_fields(&["id", "title", "score", "body", "meta"])
        .filter_fields(&["title", "score"])
        .create_unique(&["title"])
        .update_unique(&["title"])
        .updatable(&["title", "score", "body", "meta"])
        .hooks(hooks)
        .build()
        .unwrap()
}

fn articles() -> CrudResource {
    articles_with(restbase::resource::DefaultHooks)
}

fn scope() -> RequestScope {
    RequestScope::new("test-rid")
}

fn body(value: Value) -> RequestParams {
    RequestParams::new().with_json(value)
}

fn create(resource: &CrudResource, store: &MemoryStore, value: Value) -> Reply {
    resource.create(store, scope(), &body(value)).unwrap()
}

fn created_id(reply: &Reply) -> String {
    reply.envelope().data()["item"]["id"].to_string()
}

fn seed(resource: &CrudResource, store: &MemoryStore, n: i64) {
    for i in 0..n {
        let reply = create(resource, store, json!({"title": format!("a-{i}"), "score": i}));
        assert!(reply.envelope().is_success(), "seed {i} failed");
    }
}

// =============================================================================
// Create
// =============================================================================

#[test]
fn test_create_then_duplicate_leaves_one_row() {
    let store = MemoryStore::new();
    let resource = articles();

    let first = create(&resource, &store, json!({"title": "hello"}));
    assert_eq!(first.envelope().code(), SUCCESS_CODE);
    assert_eq!(first.envelope().message(), messages::CREATE_OK);
    assert_eq!(first.envelope().data()["item"]["title"], "hello");

    let second = create(&resource, &store, json!({"title": "hello"}));
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.envelope().code(), FAILED_CODE);
    assert_eq!(second.envelope().message(), messages::ALREADY_EXISTS);

    assert_eq!(store.row_count(TABLE), 1);
}

#[test]
fn test_create_with_empty_body_is_client_error() {
    let store = MemoryStore::new();
    let resource = CrudResource::builder("articles", article_model())
        .create_args(vec![ArgumentSpec::json_str("title")])
        .build()
        .unwrap();

    let reply = resource.create(&store, scope(), &RequestParams::new()).unwrap();
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
    assert_eq!(reply.envelope().message(), messages::PARAMS_REQUIRED);
    assert_eq!(store.row_count(TABLE), 0);
}

#[test]
fn test_create_missing_required_argument() {
    let store = MemoryStore::new();
    let err = articles()
        .create(&store, scope(), &body(json!({"score": 3})))
        .unwrap_err();
    assert!(matches!(err, ArgError::Missing { ref name, .. } if name == "title"));
    assert_eq!(store.row_count(TABLE), 0);
}

#[test]
fn test_create_drops_null_optional_fields() {
    let store = MemoryStore::new();
    let reply = create(&articles(), &store, json!({"title": "t", "body": null}));
    assert_eq!(reply.envelope().data()["item"]["body"], Value::Null);
}

// =============================================================================
// List
// =============================================================================

#[test]
fn test_list_second_page_of_twenty_five() {
    let store = MemoryStore::new();
    let resource = articles();
    seed(&resource, &store, 25);

    let params = RequestParams::new()
        .with_query("page", "2")
        .with_query("per_page", "10");
    let reply = resource.list(&store, scope(), &params).unwrap();

    let data = reply.envelope().data();
    assert_eq!(data["total"], 25);
    let ids: Vec<i64> = data["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (6..=15).rev().collect::<Vec<_>>());
}

#[test]
fn test_list_first_page_is_newest() {
    let store = MemoryStore::new();
    let resource = articles();
    seed(&resource, &store, 25);

    let params = RequestParams::new()
        .with_query("page", "1")
        .with_query("per_page", "3");
    let reply = resource.list(&store, scope(), &params).unwrap();
    let titles: Vec<_> = reply.envelope().data()["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["a-24", "a-23", "a-22"]);
}

#[test]
fn test_list_page_far_past_the_end_is_empty() {
    let store = MemoryStore::new();
    let resource = articles();
    seed(&resource, &store, 3);

    let params = RequestParams::new()
        .with_query("page", i64::MAX.to_string())
        .with_query("per_page", "10");
    let reply = resource.list(&store, scope(), &params).unwrap();
    assert_eq!(reply.envelope().code(), SUCCESS_CODE);
    assert_eq!(reply.envelope().data()["total"], 3);
    assert_eq!(reply.envelope().data()["items"], json!([]));
}

#[test]
fn test_list_last_partial_page_with_offset() {
    let store = MemoryStore::new();
    let resource = articles();
    seed(&resource, &store, 25);

    let params = RequestParams::new()
        .with_query("start", "20")
        .with_query("number", "10");
    let data = resource.list(&store, scope(), &params).unwrap().into_envelope();
    assert_eq!(data.data()["total"], 25);
    assert_eq!(data.data()["items"].as_array().unwrap().len(), 5);
}

#[test]
fn test_list_total_counts_filtered_rows() {
    let store = MemoryStore::new();
    let resource = articles();
    seed(&resource, &store, 25);

    let params = RequestParams::new()
        .with_query("score", r#"{"gt": 20}"#)
        .with_query("per_page", "2")
        .with_query("page", "1");
    let reply = resource.list(&store, scope(), &params).unwrap();
    let data = reply.envelope().data();
    assert_eq!(data["total"], 4);
    assert_eq!(data["items"].as_array().unwrap().len(), 2);

    let params = RequestParams::new().with_query("title", "a-7");
    let reply = resource.list(&store, scope(), &params).unwrap();
    assert_eq!(reply.envelope().data()["total"], 1);
    assert_eq!(reply.envelope().data()["items"][0]["score"], 7);
}

// =============================================================================
// Update
// =============================================================================

#[test]
fn test_update_missing_id_is_business_failure() {
    let store = MemoryStore::new();
    let reply = articles()
        .update(&store, scope(), "999", &body(json!({"title": "x"})))
        .unwrap();
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(reply.envelope().code(), FAILED_CODE);
    assert_eq!(reply.envelope().message(), messages::NOT_FOUND);
}

#[test]
fn test_update_non_numeric_id_is_not_found() {
    let store = MemoryStore::new();
    let reply = articles()
        .update(&store, scope(), "abc", &body(json!({"title": "x"})))
        .unwrap();
    assert_eq!(reply.envelope().message(), messages::NOT_FOUND);
}

#[test]
fn test_update_applies_present_whitelisted_fields() {
    let store = MemoryStore::new();
    let resource = articles();
    let id = created_id(&create(
        &resource,
        &store,
        json!({"title": "orig", "score": 1, "body": "text"}),
    ));

    let reply = resource
        .update(
            &store,
            scope(),
            &id,
            &body(json!({"score": 5, "body": null, "operator": "mallory"})),
        )
        .unwrap();
    assert_eq!(reply.envelope().message(), messages::UPDATE_OK);

    let item = &reply.envelope().data()["item"];
    assert_eq!(item["title"], "orig");
    assert_eq!(item["score"], 5);
    assert_eq!(item["body"], Value::Null);
    assert_eq!(reply.envelope().data()["key"].to_string(), id);

    let session = store.session();
    let record = session
        .get(&article_model(), id.parse().unwrap())
        .unwrap()
        .unwrap();
    assert!(record.get("operator").map_or(true, FieldValue::is_null));
}

#[test]
fn test_update_without_whitelist_assigns_declared_arguments() {
    let store = MemoryStore::new();
    let resource = CrudResource::builder("articles", article_model())
        .create_args(vec![
            ArgumentSpec::json_str("title").required(),
            ArgumentSpec::json_str("score").kind(ArgType::Int),
        ])
        .update_args(vec![
            ArgumentSpec::json_str("title"),
            ArgumentSpec::json_str("score").kind(ArgType::Int),
        ])
        .build()
        .unwrap();
    let id = created_id(&create(&resource, &store, json!({"title": "a", "score": 1})));

    let reply = resource
        .update(&store, scope(), &id, &body(json!({"score": 5})))
        .unwrap();
    assert_eq!(reply.envelope().message(), messages::UPDATE_OK);
    assert_eq!(reply.envelope().data()["item"]["score"], 5);
    assert_eq!(reply.envelope().data()["item"]["title"], "a");

    let session = store.session();
    let record = session.get(&article_model(), id.parse().unwrap()).unwrap().unwrap();
    assert_eq!(record.get("score"), Some(&FieldValue::Int(5)));
}

#[test]
fn test_update_to_taken_title_is_duplicate() {
    let store = MemoryStore::new();
    let resource = articles();
    create(&resource, &store, json!({"title": "one"}));
    let id = created_id(&create(&resource, &store, json!({"title": "two"})));

    let reply = resource
        .update(&store, scope(), &id, &body(json!({"title": "one"})))
        .unwrap();
    assert_eq!(reply.envelope().message(), messages::DUPLICATE);

    let same = resource
        .update(&store, scope(), &id, &body(json!({"title": "two", "score": 2})))
        .unwrap();
    assert!(same.envelope().is_success());
}

// =============================================================================
// Delete and soft delete
// =============================================================================

#[test]
fn test_soft_delete_then_read_is_not_found() {
    let store = MemoryStore::new();
    let resource = articles();
    let id = created_id(&create(&resource, &store, json!({"title": "gone"})));

    let deleted = resource.delete(&store, scope(), &id, &RequestParams::new()).unwrap();
    assert_eq!(deleted.envelope().message(), messages::DELETE_OK);
    assert_eq!(deleted.envelope().data()["key"].to_string(), id);

    let read = resource.read(&store, scope(), &id, &RequestParams::new()).unwrap();
    assert_eq!(read.envelope().message(), messages::NOT_FOUND);

    let listed = resource.list(&store, scope(), &RequestParams::new()).unwrap();
    assert_eq!(listed.envelope().data()["total"], 0);

    let again = resource.delete(&store, scope(), &id, &RequestParams::new()).unwrap();
    assert_eq!(again.envelope().message(), messages::NOT_FOUND);

    // still stored, only flagged
    assert_eq!(store.row_count(TABLE), 1);
    let session = store.session();
    let record = session.get(&article_model(), id.parse().unwrap()).unwrap().unwrap();
    assert!(record.is_soft_deleted());
}

#[test]
fn test_hard_delete_without_soft_delete_column() {
    let model = Arc::new(ModelSchema::new("t_tag").field(FieldDef::required_text("name")));
    let resource = CrudResource::builder("tags", model)
        .create_args(vec![ArgumentSpec::json_str("name").required()])
        .build()
        .unwrap();
    let store = MemoryStore::new();

    let id = created_id(&resource.create(&store, scope(), &body(json!({"name": "x"}))).unwrap());
    assert_eq!(store.row_count("t_tag"), 1);

    let reply = resource.delete(&store, scope(), &id, &RequestParams::new()).unwrap();
    assert!(reply.envelope().is_success());
    assert_eq!(store.row_count("t_tag"), 0);
}

// =============================================================================
// Read and serialization
// =============================================================================

#[test]
fn test_serialized_item_reparses_as_create_args() {
    let store = MemoryStore::new();
    let resource = articles();
    let id = created_id(&create(
        &resource,
        &store,
        json!({"title": "round", "score": 9, "body": "b", "meta": {"k": [1, 2]}}),
    ));

    let read = resource.read(&store, scope(), &id, &RequestParams::new()).unwrap();
    let mut item = read.envelope().data()["item"].clone();
    item.as_object_mut().unwrap().remove("id");

    let other = MemoryStore::new();
    let copy = create(&resource, &other, item.clone());
    let mut copied = copy.envelope().data()["item"].clone();
    copied.as_object_mut().unwrap().remove("id");
    assert_eq!(copied, item);
}

// =============================================================================
// Hooks and transactional behaviour
// =============================================================================

struct FailAfterFlush;

impl ResourceHooks for FailAfterFlush {
    fn create_postprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &mut Record) -> HookResult<()> {
        Err(ResourceError::hook("downstream write failed").into())
    }

    fn update_postprocess(&self, ctx: &mut PipelineContext<'_>, _record: &mut Record) -> HookResult<()> {
        Err(Interrupt::Respond(Reply::failed(ctx.request_id(), "locked")))
    }
}

#[test]
fn test_fault_during_create_persists_nothing() {
    let store = MemoryStore::new();
    let resource = articles_with(FailAfterFlush);

    let reply = create(&resource, &store, json!({"title": "doomed"}));
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(reply.envelope().code(), FAILED_CODE);
    assert_eq!(reply.envelope().message(), messages::CREATE_FAILED);
    assert_eq!(reply.envelope().request_id(), "test-rid");
    assert!(!reply.envelope().message().contains("downstream"));
    assert_eq!(store.row_count(TABLE), 0);
}

#[test]
fn test_hook_reply_rolls_back_update() {
    let store = MemoryStore::new();
    let id = created_id(&create(&articles(), &store, json!({"title": "keep", "score": 1})));

    let reply = articles_with(FailAfterFlush)
        .update(&store, scope(), &id, &body(json!({"score": 2})))
        .unwrap();
    assert_eq!(reply.envelope().message(), "locked");

    let session = store.session();
    let record = session.get(&article_model(), id.parse().unwrap()).unwrap().unwrap();
    assert_eq!(record.get("score"), Some(&FieldValue::Int(1)));
}

struct OwnedOnly;

impl ResourceHooks for OwnedOnly {
    fn list_filter(
        &self,
        ctx: &mut PipelineContext<'_>,
        query: restbase::storage::Query,
    ) -> HookResult<restbase::storage::Query> {
        let owner = ctx.identity().unwrap_or("nobody").to_string();
        Ok(query.filter_eq("operator", &json!(owner))?)
    }

    fn create_preprocess(&self, ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        if let Some(identity) = ctx.identity().map(str::to_string) {
            ctx.args.insert("operator".into(), json!(identity));
        }
        Ok(())
    }
}

#[test]
fn test_hooks_scope_list_to_identity() {
    let store = MemoryStore::new();
    let resource = articles_with(OwnedOnly);

    for (title, who) in [("a", "alice"), ("b", "bob"), ("c", "alice")] {
        let reply = resource
            .create(&store, scope().with_identity(who), &body(json!({"title": title})))
            .unwrap();
        assert!(reply.envelope().is_success());
    }

    let reply = resource
        .list(&store, scope().with_identity("alice"), &RequestParams::new())
        .unwrap();
    assert_eq!(reply.envelope().data()["total"], 2);
}

// =============================================================================
// System faults on every operation
// =============================================================================

struct FaultEverywhere;

impl ResourceHooks for FaultEverywhere {
    fn list_filter(
        &self,
        _ctx: &mut PipelineContext<'_>,
        _query: restbase::storage::Query,
    ) -> HookResult<restbase::storage::Query> {
        Err(ResourceError::hook("index unavailable").into())
    }

    fn read_item(&self, _ctx: &mut PipelineContext<'_>, _id: i64) -> HookResult<Option<Record>> {
        Err(ResourceError::hook("replica lagging").into())
    }

    fn update_postprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &mut Record) -> HookResult<()> {
        Err(ResourceError::hook("audit sink down").into())
    }

    fn delete_postprocess(&self, _ctx: &mut PipelineContext<'_>, _record: &Record) -> HookResult<()> {
        Err(ResourceError::hook("audit sink down").into())
    }
}

fn assert_generic_failure(reply: &Reply, message: &str) {
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(reply.envelope().code(), FAILED_CODE);
    assert_eq!(reply.envelope().message(), message);
    assert_eq!(reply.envelope().data(), &json!({}));
    assert_eq!(reply.envelope().request_id(), "test-rid");
}

#[test]
fn test_list_fault_is_query_failed() {
    let store = MemoryStore::new();
    seed(&articles(), &store, 3);

    let reply = articles_with(FaultEverywhere)
        .list(&store, scope(), &RequestParams::new())
        .unwrap();
    assert_generic_failure(&reply, messages::QUERY_FAILED);
}

#[test]
fn test_read_fault_is_query_failed() {
    let store = MemoryStore::new();
    let id = created_id(&create(&articles(), &store, json!({"title": "r"})));

    let reply = articles_with(FaultEverywhere)
        .read(&store, scope(), &id, &RequestParams::new())
        .unwrap();
    assert_generic_failure(&reply, messages::QUERY_FAILED);
}

#[test]
fn test_update_fault_persists_nothing() {
    let store = MemoryStore::new();
    let id = created_id(&create(&articles(), &store, json!({"title": "keep", "score": 1})));

    let reply = articles_with(FaultEverywhere)
        .update(&store, scope(), &id, &body(json!({"title": "changed", "score": 2})))
        .unwrap();
    assert_generic_failure(&reply, messages::UPDATE_FAILED);

    let session = store.session();
    let record = session.get(&article_model(), id.parse().unwrap()).unwrap().unwrap();
    assert_eq!(record.get("title"), Some(&FieldValue::Text("keep".into())));
    assert_eq!(record.get("score"), Some(&FieldValue::Int(1)));
}

#[test]
fn test_delete_fault_persists_nothing() {
    let store = MemoryStore::new();
    let id = created_id(&create(&articles(), &store, json!({"title": "stay"})));

    let reply = articles_with(FaultEverywhere)
        .delete(&store, scope(), &id, &RequestParams::new())
        .unwrap();
    assert_generic_failure(&reply, messages::DELETE_FAILED);

    let read = articles().read(&store, scope(), &id, &RequestParams::new()).unwrap();
    assert!(read.envelope().is_success());
    let session = store.session();
    let record = session.get(&article_model(), id.parse().unwrap()).unwrap().unwrap();
    assert!(!record.is_soft_deleted());
}

// =============================================================================
// Commit hook
// =============================================================================

#[derive(Default)]
struct CommitCounter {
    committed: Arc<AtomicUsize>,
    refuse_shape: bool,
}

impl ResourceHooks for CommitCounter {
    fn create_shape(&self, ctx: &mut PipelineContext<'_>, item: Value) -> HookResult<Value> {
        if self.refuse_shape {
            return Err(Interrupt::Respond(Reply::failed(ctx.request_id(), "shape refused")));
        }
        Ok(item)
    }

    fn create_committed(&self, _ctx: &PipelineContext<'_>, record: &Record) {
        assert!(record.id().is_some());
        self.committed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_commit_hook_runs_after_successful_create() {
    let store = MemoryStore::new();
    let hooks = CommitCounter::default();
    let committed = Arc::clone(&hooks.committed);
    let resource = articles_with(hooks);

    assert!(create(&resource, &store, json!({"title": "one"})).envelope().is_success());
    create(&resource, &store, json!({"title": "one"}));
    assert_eq!(committed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_commit_hook_skipped_when_create_rolls_back() {
    let store = MemoryStore::new();
    let hooks = CommitCounter {
        refuse_shape: true,
        ..CommitCounter::default()
    };
    let committed = Arc::clone(&hooks.committed);
    let resource = articles_with(hooks);

    let reply = create(&resource, &store, json!({"title": "late"}));
    assert_eq!(reply.envelope().message(), "shape refused");
    assert_eq!(store.row_count(TABLE), 0);
    assert_eq!(committed.load(Ordering::SeqCst), 0);
}
