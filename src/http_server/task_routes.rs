//! # Task Status

use axum::extract::{Path, State};
use axum::routing::{get, MethodRouter};
use serde_json::json;
use uuid::Uuid;

use super::state::AppState;
use crate::resource::{messages, Reply, RequestScope};

/// Message for unknown or malformed task ids
pub const TASK_NOT_FOUND: &str = "task not found";

/// `GET {prefix}/tasks/{id}`
pub async fn task_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    scope: RequestScope,
) -> Reply {
    let status = Uuid::parse_str(&id)
        .ok()
        .and_then(|task_id| state.tasks.status(task_id));

    match status {
        Some(status) => Reply::ok(
            scope.request_id,
            messages::OK,
            json!({ "key": id, "status": status }),
        ),
        None => Reply::failed(scope.request_id, TASK_NOT_FOUND),
    }
}

pub fn task_status_route() -> MethodRouter<AppState> {
    get(task_status_handler)
}
