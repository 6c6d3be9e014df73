//! # Response Envelope
//!
//! Every API response body is a [`ResponseEnvelope`]:
//! `{"code", "message", "data", "request_id"}`. HTTP status is carried next
//! to it in a [`Reply`] and is independent of `code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Business success
pub const SUCCESS_CODE: i32 = 1;
/// Business failure
pub const FAILED_CODE: i32 = 0;

/// Canonical envelope messages
pub mod messages {
    pub const OK: &str = "request succeeded";
    pub const QUERY_FAILED: &str = "query failed";
    pub const PARAMS_REQUIRED: &str = "parameters required";
    pub const ALREADY_EXISTS: &str = "record already exists";
    pub const NOT_FOUND: &str = "record not found";
    pub const DUPLICATE: &str = "duplicate record";
    pub const CREATE_OK: &str = "create succeeded";
    pub const CREATE_FAILED: &str = "create failed";
    pub const UPDATE_OK: &str = "update succeeded";
    pub const UPDATE_FAILED: &str = "update failed";
    pub const DELETE_OK: &str = "delete succeeded";
    pub const DELETE_FAILED: &str = "delete failed";
    pub const SERVICE_ERROR: &str = "service error";
    pub const UNAUTHORIZED: &str = "authentication required";
}

/// Uniform response body. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    code: i32,
    message: String,
    data: Value,
    request_id: String,
}

impl ResponseEnvelope {
    /// Build an envelope; a null `data` becomes an empty object
    pub fn new(
        code: i32,
        message: impl Into<String>,
        data: Value,
        request_id: impl Into<String>,
    ) -> Self {
        let data = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };
        Self {
            code,
            message: message.into(),
            data,
            request_id: request_id.into(),
        }
    }

    pub fn success(message: impl Into<String>, data: Value, request_id: impl Into<String>) -> Self {
        Self::new(SUCCESS_CODE, message, data, request_id)
    }

    pub fn failed(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(FAILED_CODE, message, Value::Null, request_id)
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// An envelope and the HTTP status it is sent with
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    envelope: ResponseEnvelope,
}

impl Reply {
    /// SUCCESS envelope, HTTP 200
    pub fn ok(request_id: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: ResponseEnvelope::success(message, data, request_id),
        }
    }

    /// FAILED envelope, HTTP 200
    pub fn failed(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: ResponseEnvelope::failed(message, request_id),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> ResponseEnvelope {
        self.envelope
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
