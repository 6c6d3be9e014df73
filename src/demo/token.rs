//! # Token Endpoint
//!
//! `POST {prefix}/auth/token` exchanges a demo user's phone and password for
//! an access token whose subject is the user's uuid.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use super::user::user_model;
use crate::auth::{verify_password, AuthError, TokenResponse};
use crate::http_server::routes::arg_error_reply;
use crate::http_server::AppState;
use crate::resource::{
    messages, parse_args, ArgumentSpec, FilterTranslator, Reply, RequestParams, RequestScope,
};
use crate::storage::{FieldValue, Record};

fn token_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::json_str("phone").required(),
        ArgumentSpec::json_str("password").required(),
    ]
}

fn text_field<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    match record.get(field) {
        Some(FieldValue::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn auth_failure(request_id: &str, err: AuthError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED);
    Reply::failed(request_id, err.to_string())
        .with_status(status)
        .into_response()
}

/// Verify credentials and issue a bearer token
pub async fn token_handler(
    State(state): State<AppState>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id;
    let args = match parse_args(&token_args(), &params) {
        Ok(args) => args,
        Err(err) => return arg_error_reply(&request_id, &err).into_response(),
    };
    let phone = args.get("phone").cloned().unwrap_or(Value::Null);
    let password = args.get("password").and_then(Value::as_str).unwrap_or_default();

    let filters: Map<String, Value> = [("phone".to_string(), phone)].into_iter().collect();
    let user = {
        let session = state.store.session();
        FilterTranslator::new(user_model()).first(session.as_ref(), &filters)
    };
    let user = match user {
        Ok(Some(user)) => user,
        Ok(None) => return auth_failure(&request_id, AuthError::InvalidCredentials),
        Err(err) => {
            error!(request_id = %request_id, error = %err, "User lookup failed");
            return Reply::failed(request_id, messages::QUERY_FAILED).into_response();
        }
    };

    let verified = text_field(&user, "password")
        .map(|hash| verify_password(password, hash))
        .unwrap_or(Ok(false));
    match verified {
        Ok(true) => {}
        Ok(false) => {
            warn!(request_id = %request_id, user_id = ?user.id(), "Password mismatch");
            return auth_failure(&request_id, AuthError::InvalidCredentials);
        }
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Password verification failed");
            return auth_failure(&request_id, err);
        }
    }

    let identity = text_field(&user, "uuid").unwrap_or_default().to_string();
    let mut claims = Map::new();
    claims.insert("user_id".to_string(), json!(user.id()));

    let token = match state.jwt.issue(&identity, claims) {
        Ok(token) => token,
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Token issue failed");
            return auth_failure(&request_id, err);
        }
    };

    let body = TokenResponse::bearer(token, state.jwt.ttl_secs());
    match serde_json::to_value(&body) {
        Ok(data) => Reply::ok(request_id, messages::OK, data).into_response(),
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Token response encoding failed");
            Reply::failed(request_id, messages::SERVICE_ERROR).into_response()
        }
    }
}
