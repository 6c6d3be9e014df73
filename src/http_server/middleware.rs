//! # Request Middleware
//!
//! Request ids, access logging, panic containment and bearer authentication.
//! Layering order in [`super::server::build_router`], outermost first: CORS,
//! the tower-http trace span, request id, access log, panic guard. CORS
//! preflights are answered before a request id is assigned.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Extensions, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use super::state::AppState;
use crate::auth::AuthError;
use crate::resource::{messages, Reply};

/// Header carrying the request id in both directions
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Request id of the current request, or a fresh one outside the middleware
pub fn request_id_of(extensions: &Extensions) -> String {
    extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Adopt the caller's `X-Request-Id` or mint one, and echo it back
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!("request", request_id = %id);

    async move {
        let mut response = next.run(req).await;
        if let Ok(value) = HeaderValue::from_str(&id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(X_REQUEST_ID), value);
        }
        response
    }
    .instrument(span)
    .await
}

/// One line per request on the `access` target
pub async fn access_log(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let ip = client_ip(&req);
    let request_id = request_id_of(req.extensions());

    let response = next.run(req).await;

    info!(
        target: "access",
        ip = %ip,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        request_id = %request_id,
        "request"
    );
    response
}

fn client_ip(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_owned())
}

/// Turn a panic below this layer into a 500 envelope
pub async fn catch_panic(req: Request, next: Next) -> Response {
    let request_id = request_id_of(req.extensions());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                panic = %detail,
                "Handler panicked"
            );
            Reply::failed(request_id, messages::SERVICE_ERROR)
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}

/// Reject requests without a valid bearer token; store its claims otherwise
pub async fn require_bearer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let request_id = request_id_of(req.extensions());

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return unauthorized(&request_id, &AuthError::AuthenticationRequired);
    };

    match state.jwt.validate(&token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(request_id = %request_id, error = %err, "Bearer token rejected");
            unauthorized(&request_id, &err)
        }
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn unauthorized(request_id: &str, err: &AuthError) -> Response {
    let message = match err {
        AuthError::AuthenticationRequired => messages::UNAUTHORIZED.to_owned(),
        other => other.to_string(),
    };
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED);
    Reply::failed(request_id, message)
        .with_status(status)
        .into_response()
}
