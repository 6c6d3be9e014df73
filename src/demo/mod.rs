//! # Demo Application
//!
//! The sample `t_user` resource and its token endpoint, mounted next to the
//! built-in routes.

pub mod token;
pub mod user;

use std::sync::Arc;

use axum::routing::post;

use crate::http_server::Routes;
use crate::resource::ResourceResult;

pub use token::token_handler;
pub use user::{user_model, user_resource, welcome_task, UserHooks, USER_TABLE, WELCOME_TASK};

/// Register the demo task handler and mount the demo routes
pub fn mount(routes: Routes) -> ResourceResult<Routes> {
    let tasks = routes.state().tasks.clone();
    tasks.register(WELCOME_TASK, welcome_task);

    let users = Arc::new(user_resource(tasks)?);
    Ok(routes
        .resource("/users", users)
        .route("/auth/token", post(token_handler)))
}
