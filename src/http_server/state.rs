//! # Shared Application State

use std::sync::Arc;

use crate::auth::JwtManager;
use crate::config::AppConfig;
use crate::storage::{MemoryStore, Store};
use crate::tasks::TaskQueue;

/// Everything a handler may reach, cloned into each request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub jwt: JwtManager,
    pub tasks: TaskQueue,
    /// Client for upstream calls made by streaming endpoints
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let jwt = JwtManager::new(config.jwt.to_jwt_config());
        let tasks = TaskQueue::with_status_capacity(config.tasks.status_capacity);
        Self {
            config: Arc::new(config),
            store,
            jwt,
            tasks,
            http: reqwest::Client::new(),
        }
    }

    /// State backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Configured API prefix without a trailing slash
    pub fn api_prefix(&self) -> &str {
        self.config.server.api_prefix.trim_end_matches('/')
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("jwt", &self.jwt)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
