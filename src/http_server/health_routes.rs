//! # Heartbeat

use axum::routing::{get, MethodRouter};
use serde_json::json;

use super::state::AppState;
use crate::resource::{messages, Reply, RequestScope};

/// Liveness probe served at `{prefix}/`
pub async fn heartbeat_handler(scope: RequestScope) -> Reply {
    Reply::ok(
        scope.request_id,
        messages::OK,
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

pub fn heartbeat_route() -> MethodRouter<AppState> {
    get(heartbeat_handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_reply() {
        let reply = heartbeat_handler(RequestScope::new("hb")).await;
        assert!(reply.envelope().is_success());
        assert_eq!(reply.envelope().data()["status"], "ok");
        assert_eq!(reply.envelope().request_id(), "hb");
    }
}
