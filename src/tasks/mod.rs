//! # Background Tasks
//!
//! In-process job queue for work that should not block a request, such as
//! follow-up processing after a record is created.

mod errors;
mod queue;

pub use errors::{TaskError, TaskResult};
pub use queue::{TaskFuture, TaskHandler, TaskId, TaskQueue, TaskStatus, DEFAULT_STATUS_CAPACITY};
