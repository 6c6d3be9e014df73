//! # HTTP Server
//!
//! Assembles every router behind the shared middleware stack and serves it.

use std::net::SocketAddr;

use axum::middleware;
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::health_routes::heartbeat_route;
use super::middleware::{access_log, catch_panic, request_id};
use super::routes::Routes;
use super::sse_routes::sse_demo_route;
use super::state::AppState;
use super::task_routes::task_status_route;
use crate::config::ServerConfig;
use crate::demo;
use crate::resource::{Reply, RequestScope, ResourceResult};

/// Message for paths no route matches
pub const ROUTE_NOT_FOUND: &str = "resource not found";

async fn route_not_found(scope: RequestScope) -> impl IntoResponse {
    Reply::failed(scope.request_id, ROUTE_NOT_FOUND).with_status(axum::http::StatusCode::NOT_FOUND)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_allows_any() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router for `state`
pub fn build_router(state: AppState) -> ResourceResult<Router> {
    let routes = Routes::new(state.clone())
        .route("/", heartbeat_route())
        .route("/demo/sse", sse_demo_route())
        .route("/tasks/{id}", task_status_route());
    let routes = demo::mount(routes)?;

    Ok(routes
        .into_router()
        .fallback(route_not_found)
        .layer(middleware::from_fn(catch_panic))
        .layer(middleware::from_fn(access_log))
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server))
        .with_state(state))
}

/// HTTP server bound to the configured address
pub struct HttpServer {
    state: AppState,
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> ResourceResult<Self> {
        let router = build_router(state.clone())?;
        Ok(Self { state, router })
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.state.config.server.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until Ctrl-C, then drain background tasks
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr = self.socket_addr();
        self.state
            .tasks
            .start(self.state.config.tasks.workers)
            .map_err(std::io::Error::other)?;

        let listener = TcpListener::bind(&addr).await?;
        info!(
            addr = %addr,
            prefix = %self.state.api_prefix(),
            profile = ?self.state.config.profile,
            "restbase listening"
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.state.tasks.shutdown().await;
        info!("restbase stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_server_creation() {
        let server = HttpServer::new(AppState::in_memory(AppConfig::default())).unwrap();
        assert_eq!(server.socket_addr(), "0.0.0.0:9898");
    }

    #[test]
    fn test_server_with_custom_port() {
        let mut config = AppConfig::default();
        config.server.port = 8080;
        let server = HttpServer::new(AppState::in_memory(config)).unwrap();
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_router_builds() {
        let server = HttpServer::new(AppState::in_memory(AppConfig::default())).unwrap();
        let _router = server.router();
    }

    #[test]
    fn test_cors_with_origin_list() {
        let mut config = ServerConfig::default();
        config.cors_origins = vec!["https://example.com".into()];
        assert!(!config.cors_allows_any());
        let _layer = cors_layer(&config);
    }
}
