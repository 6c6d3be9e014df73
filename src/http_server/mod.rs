//! # HTTP Server Module
//!
//! axum wiring for the resource pipeline.
//!
//! # Endpoints
//!
//! - `{prefix}/` - Heartbeat
//! - `{prefix}/users`, `{prefix}/users/{id}` - Demo user resource
//! - `{prefix}/auth/token` - Access token for a demo user
//! - `{prefix}/tasks/{id}` - Background task status
//! - `{prefix}/demo/sse` - Streaming relay

pub mod extract;
pub mod health_routes;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sse_routes;
pub mod state;
pub mod task_routes;

pub use middleware::{RequestId, X_REQUEST_ID};
pub use routes::Routes;
pub use server::{build_router, HttpServer};
pub use state::AppState;
