//! # Task Errors

use thiserror::Error;

/// Result type for task queue operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Task queue errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    /// No handler registered under this name
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Queue not started or already shut down
    #[error("Task queue is not running")]
    NotRunning,

    /// Shared state lock was poisoned
    #[error("Task queue lock poisoned")]
    LockPoisoned,
}
