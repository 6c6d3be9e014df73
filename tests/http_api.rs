//! HTTP API Tests
//!
//! Exercises the assembled axum router with `tower::ServiceExt::oneshot`:
//! envelopes, status codes, request id propagation, layer ordering, method
//! gating, the bearer gate and the demo user resource.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::{middleware, Router};
use restbase::config::AppConfig;
use restbase::http_server::middleware::request_id;
use restbase::http_server::{build_router, AppState, Routes};
use restbase::resource::{messages, ArgumentSpec, CrudResource, FAILED_CODE, SUCCESS_CODE};
use restbase::storage::{FieldDef, ModelSchema};
use serde_json::{json, Value};
use tower::ServiceExt;

// =============================================================================
// Test Utilities
// =============================================================================

fn app() -> (Router, AppState) {
    let state = AppState::in_memory(AppConfig::default());
    let router = build_router(state.clone()).unwrap();
    (router, state)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn new_user(phone: &str) -> Value {
    json!({
        "phone": phone,
        "password": "secret1",
        "real_name": "Li Lei",
        "other_info": {"city": "Hangzhou"},
    })
}

// =============================================================================
// Heartbeat and request ids
// =============================================================================

#[tokio::test]
async fn test_heartbeat_envelope() {
    let (app, _) = app();
    let (status, headers, body) = send(&app, empty_request(Method::GET, "/api/v1/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], SUCCESS_CODE);
    assert_eq!(body["message"], messages::OK);
    assert_eq!(body["data"]["status"], "ok");

    let rid = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(body["request_id"], rid);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = app();
    let req = Request::builder()
        .uri("/api/v1/")
        .header("X-Request-Id", "caller-42")
        .body(Body::empty())
        .unwrap();
    let (_, headers, body) = send(&app, req).await;

    assert_eq!(headers.get("x-request-id").unwrap(), "caller-42");
    assert_eq!(body["request_id"], "caller-42");
}

#[tokio::test]
async fn test_cors_preflight_answered_outside_request_id() {
    let (app, _) = app();
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/users")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, preflight).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(!headers.contains_key("x-request-id"));

    let req = Request::builder()
        .uri("/api/v1/")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app, req).await;
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unknown_path_is_failed_envelope() {
    let (app, _) = app();
    let (status, _, body) = send(&app, empty_request(Method::GET, "/api/v1/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["data"], json!({}));
}

// =============================================================================
// Demo user resource
// =============================================================================

#[tokio::test]
async fn test_user_create_duplicate_and_list() {
    let (app, _) = app();

    let (status, _, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/users", new_user("13900000001")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], SUCCESS_CODE);
    assert_eq!(body["message"], messages::CREATE_OK);
    assert!(body["data"]["item"].get("password").is_none());
    assert_eq!(body["data"]["item"]["other_info"]["city"], "Hangzhou");

    let (status, _, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/users", new_user("13900000001")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], messages::ALREADY_EXISTS);

    let (status, _, body) = send(
        &app,
        empty_request(Method::GET, "/api/v1/users?phone=13900000001&page=1&per_page=10"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["real_name"], "Li Lei");
}

#[tokio::test]
async fn test_user_update_read_delete() {
    let (app, _) = app();
    let (_, _, created) = send(
        &app,
        json_request(Method::POST, "/api/v1/users", new_user("13900000002")),
    )
    .await;
    let id = created["data"]["item"]["id"].as_i64().unwrap();
    let item_uri = format!("/api/v1/users/{id}");

    let (status, _, body) = send(
        &app,
        json_request(Method::PUT, &item_uri, json!({"nick_name": "lei", "phone": "000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], messages::UPDATE_OK);
    assert_eq!(body["data"]["key"], id);
    assert_eq!(body["data"]["item"]["nick_name"], "lei");
    assert_eq!(body["data"]["item"]["phone"], "13900000002");

    let (_, _, body) = send(&app, empty_request(Method::GET, &item_uri)).await;
    assert_eq!(body["code"], SUCCESS_CODE);
    assert_eq!(body["data"]["item"]["nick_name"], "lei");

    let (_, _, body) = send(&app, empty_request(Method::DELETE, &item_uri)).await;
    assert_eq!(body["message"], messages::DELETE_OK);

    let (status, _, body) = send(&app, empty_request(Method::GET, &item_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], messages::NOT_FOUND);
}

#[tokio::test]
async fn test_update_missing_user_is_not_found_with_200() {
    let (app, _) = app();
    let (status, _, body) = send(
        &app,
        json_request(Method::PUT, "/api/v1/users/4242", json!({"real_name": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], messages::NOT_FOUND);
}

#[tokio::test]
async fn test_argument_errors_are_bad_request() {
    let (app, _) = app();

    let (status, _, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/users", json!({"phone": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], FAILED_CODE);
    assert!(body["message"].as_str().unwrap().contains("password"));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{broken"))
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], FAILED_CODE);

    let (status, _, body) = send(&app, json_request(Method::PUT, "/api/v1/users/1", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], messages::PARAMS_REQUIRED);
}

#[tokio::test]
async fn test_disallowed_verb_is_404() {
    let (app, _) = app();
    let (status, _, body) = send(&app, empty_request(Method::PATCH, "/api/v1/users")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], "PATCH method is not allowed");

    let (status, _, body) = send(&app, empty_request(Method::POST, "/api/v1/users/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "POST method is not allowed");
}

// =============================================================================
// Tokens and the bearer gate
// =============================================================================

#[tokio::test]
async fn test_token_endpoint() {
    let (app, state) = app();
    send(
        &app,
        json_request(Method::POST, "/api/v1/users", new_user("13900000003")),
    )
    .await;

    let (status, _, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/auth/token",
            json!({"phone": "13900000003", "password": "secret1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token_type"], "bearer");
    assert_eq!(body["data"]["expires_in"], 7200);

    let token = body["data"]["access_token"].as_str().unwrap();
    let claims = state.jwt.validate(token).unwrap();
    assert!(!claims.sub.is_empty());

    let (status, _, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/auth/token",
            json!({"phone": "13900000003", "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], FAILED_CODE);
}

fn protected_app() -> (Router, AppState) {
    let state = AppState::in_memory(AppConfig::default());
    let model = Arc::new(
        ModelSchema::new("t_note")
            .field(FieldDef::required_text("text"))
            .with_audit_fields(),
    );
    let notes = CrudResource::builder("notes", model)
        .create_args(vec![ArgumentSpec::json_str("text").required()])
        .require_auth()
        .build()
        .unwrap();

    let router = Routes::new(state.clone())
        .resource("/notes", Arc::new(notes))
        .into_router()
        .layer(middleware::from_fn(request_id))
        .with_state(state.clone());
    (router, state)
}

#[tokio::test]
async fn test_bearer_gate() {
    let (app, state) = protected_app();

    let (status, _, body) = send(&app, empty_request(Method::GET, "/api/v1/notes")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], messages::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/v1/notes")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = state.jwt.issue("writer-1", Default::default()).unwrap();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/notes")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"text": "hi"}).to_string()))
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], SUCCESS_CODE);
    assert_eq!(body["data"]["item"]["text"], "hi");
}

// =============================================================================
// Tasks and streaming
// =============================================================================

#[tokio::test]
async fn test_unknown_task_status() {
    let (app, _) = app();
    let (status, _, body) = send(
        &app,
        empty_request(Method::GET, "/api/v1/tasks/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], "task not found");
}

#[tokio::test]
async fn test_task_status_after_run() {
    let (app, state) = app();
    state
        .tasks
        .register("echo", |payload: Value| async move { Ok::<_, String>(payload) });
    state.tasks.start(1).unwrap();
    let id = state.tasks.enqueue("echo", json!({"n": 1})).unwrap();
    state.tasks.shutdown().await;

    let (status, _, body) = send(&app, empty_request(Method::GET, &format!("/api/v1/tasks/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], SUCCESS_CODE);
    assert_eq!(body["data"]["key"], id.to_string());
    assert_eq!(body["data"]["status"]["state"], "succeeded");
    assert_eq!(body["data"]["status"]["result"]["n"], 1);
}

#[tokio::test]
async fn test_sse_without_upstream_is_bad_request() {
    let (app, _) = app();
    let (status, _, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/demo/sse", json!({"prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], FAILED_CODE);
    assert_eq!(body["message"], "upstream not configured");
}
