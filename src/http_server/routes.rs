//! # Route Registry
//!
//! Mounts [`CrudResource`]s under the API prefix. A collection path serves
//! list (GET) and create (POST); a member path `{path}/{id}` serves read
//! (GET), update (PUT) and delete (DELETE). Only enabled operations get a
//! handler; any other verb on a mounted path answers
//! [`method_not_allowed`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::{Extension, Router};
use tracing::debug;

use super::middleware::require_bearer;
use super::state::AppState;
use crate::resource::{
    method_not_allowed, ArgError, CrudResource, Operation, PipelineResult, Reply, RequestParams,
    RequestScope,
};

/// Argument errors are client errors
pub fn arg_error_reply(request_id: &str, err: &ArgError) -> Reply {
    Reply::failed(request_id, err.to_string()).with_status(StatusCode::BAD_REQUEST)
}

fn into_response(request_id: &str, result: PipelineResult) -> Response {
    match result {
        Ok(reply) => reply.into_response(),
        Err(err) => {
            debug!(request_id, argument = err.name(), error = %err, "Argument rejected");
            arg_error_reply(request_id, &err).into_response()
        }
    }
}

// ==================
// Resource handlers
// ==================

async fn list_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<CrudResource>>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id.clone();
    into_response(&request_id, resource.list(state.store.as_ref(), scope, &params))
}

async fn create_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<CrudResource>>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id.clone();
    into_response(&request_id, resource.create(state.store.as_ref(), scope, &params))
}

async fn read_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<CrudResource>>,
    Path(id): Path<String>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id.clone();
    into_response(&request_id, resource.read(state.store.as_ref(), scope, &id, &params))
}

async fn update_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<CrudResource>>,
    Path(id): Path<String>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id.clone();
    into_response(&request_id, resource.update(state.store.as_ref(), scope, &id, &params))
}

async fn delete_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<CrudResource>>,
    Path(id): Path<String>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id.clone();
    into_response(&request_id, resource.delete(state.store.as_ref(), scope, &id, &params))
}

async fn not_allowed_handler(method: Method, scope: RequestScope) -> Reply {
    method_not_allowed(&scope.request_id, &method)
}

/// Builder collecting every route of the API
pub struct Routes {
    state: AppState,
    prefix: String,
    router: Router<AppState>,
}

impl Routes {
    /// Routes under the configured API prefix
    pub fn new(state: AppState) -> Self {
        let prefix = state.api_prefix().to_owned();
        Self {
            state,
            prefix,
            router: Router::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Absolute path of `path` under the prefix
    pub fn path(&self, path: &str) -> String {
        match path.trim_matches('/') {
            "" => format!("{}/", self.prefix),
            tail => format!("{}/{}", self.prefix, tail),
        }
    }

    /// Mount a plain handler
    pub fn route(mut self, path: &str, method_router: MethodRouter<AppState>) -> Self {
        let full = self.path(path);
        self.router = self.router.route(&full, method_router);
        self
    }

    /// List and create at `path`
    pub fn collection(self, path: &str, resource: Arc<CrudResource>) -> Self {
        let ops = resource.operations();
        let mut methods = MethodRouter::new();
        if ops.contains(Operation::List) {
            methods = methods.get(list_handler);
        }
        if ops.contains(Operation::Create) {
            methods = methods.post(create_handler);
        }
        let enabled = ops.contains(Operation::List) || ops.contains(Operation::Create);
        self.mount(path, enabled, methods, resource)
    }

    /// Read, update and delete at `path/{id}`
    pub fn member(self, path: &str, resource: Arc<CrudResource>) -> Self {
        let ops = resource.operations();
        let mut methods = MethodRouter::new();
        if ops.contains(Operation::Read) {
            methods = methods.get(read_handler);
        }
        if ops.contains(Operation::Update) {
            methods = methods.put(update_handler);
        }
        if ops.contains(Operation::Delete) {
            methods = methods.delete(delete_handler);
        }
        let enabled = [Operation::Read, Operation::Update, Operation::Delete]
            .into_iter()
            .any(|op| ops.contains(op));
        let member_path = format!("{}/{{id}}", path.trim_end_matches('/'));
        self.mount(&member_path, enabled, methods, resource)
    }

    /// Both the collection and the member paths
    pub fn resource(self, path: &str, resource: Arc<CrudResource>) -> Self {
        self.collection(path, Arc::clone(&resource))
            .member(path, resource)
    }

    fn mount(
        self,
        path: &str,
        enabled: bool,
        methods: MethodRouter<AppState>,
        resource: Arc<CrudResource>,
    ) -> Self {
        if !enabled {
            return self;
        }

        let mut methods = methods.fallback(not_allowed_handler);
        if resource.auth_required() {
            methods = methods.route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_bearer,
            ));
        }
        debug!(resource = resource.name(), path, "Mounting resource");
        self.route(path, methods.layer(Extension(resource)))
    }

    pub fn into_router(self) -> Router<AppState> {
        self.router
    }
}
