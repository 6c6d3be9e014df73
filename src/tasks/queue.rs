//! # Task Queue
//!
//! Named async handlers fed by an unbounded channel and drained by a fixed
//! pool of tokio workers. Status is tracked per task id; only the most
//! recent finished statuses are retained, while pending and running ones are
//! always kept. Delivery is at-most-once: jobs still queued at shutdown are
//! drained, but a crashed process loses them.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{TaskError, TaskResult};

/// Finished statuses kept by [`TaskQueue::new`]
pub const DEFAULT_STATUS_CAPACITY: usize = 1024;

/// Identifier handed out by [`TaskQueue::enqueue`]
pub type TaskId = Uuid;

/// Boxed future returned by a [`TaskHandler`]
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// Lifecycle of one enqueued task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded { result: Value },
    Failed { error: String },
}

/// Async job body
pub trait TaskHandler: Send + Sync + 'static {
    fn run(&self, payload: Value) -> TaskFuture;
}

impl<F, Fut> TaskHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    fn run(&self, payload: Value) -> TaskFuture {
        Box::pin(self(payload))
    }
}

struct Job {
    id: TaskId,
    name: String,
    payload: Value,
}

struct Inner {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
    /// Finished task ids, oldest first
    finished: Mutex<VecDeque<TaskId>>,
    status_capacity: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn with_capacity(status_capacity: usize) -> Self {
        Self {
            handlers: RwLock::default(),
            statuses: RwLock::default(),
            finished: Mutex::default(),
            status_capacity,
            sender: Mutex::default(),
            workers: Mutex::default(),
        }
    }

    fn set_status(&self, id: TaskId, status: TaskStatus) {
        let done = matches!(status, TaskStatus::Succeeded { .. } | TaskStatus::Failed { .. });
        if let Ok(mut statuses) = self.statuses.write() {
            statuses.insert(id, status);
        }
        if done {
            self.retire(id);
        }
    }

    /// Record `id` as finished and evict the oldest finished statuses past capacity
    fn retire(&self, id: TaskId) {
        let Ok(mut finished) = self.finished.lock() else {
            return;
        };
        finished.push_back(id);
        if finished.len() <= self.status_capacity {
            return;
        }
        if let Ok(mut statuses) = self.statuses.write() {
            while finished.len() > self.status_capacity {
                if let Some(old) = finished.pop_front() {
                    statuses.remove(&old);
                }
            }
        }
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().ok()?.get(name).cloned()
    }
}

/// Cloneable handle to a shared worker pool
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::with_status_capacity(DEFAULT_STATUS_CAPACITY)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("running", &self.is_running())
            .finish()
    }
}

impl TaskQueue {
    /// Queue with no workers; call [`TaskQueue::start`] before enqueueing
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that keeps at most `capacity` finished statuses
    pub fn with_status_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner::with_capacity(capacity)),
        }
    }

    /// Register (or replace) the handler for `name`
    pub fn register(&self, name: impl Into<String>, handler: impl TaskHandler) {
        if let Ok(mut handlers) = self.inner.handlers.write() {
            handlers.insert(name.into(), Arc::new(handler));
        }
    }

    /// Spawn `workers` tokio tasks. Must be called inside a runtime.
    /// Starting an already running queue does nothing.
    pub fn start(&self, workers: usize) -> TaskResult<()> {
        let mut sender = self.inner.sender.lock().map_err(|_| TaskError::LockPoisoned)?;
        if sender.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = self.inner.workers.lock().map_err(|_| TaskError::LockPoisoned)?;

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let inner = Arc::clone(&self.inner);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some(job) = job else { break };
                    run_job(&inner, worker, job).await;
                }
                debug!(worker, "Task worker stopped");
            }));
        }

        *sender = Some(tx);
        info!(workers = workers.max(1), "Task queue started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .sender
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Queue a job for the handler registered under `name`
    pub fn enqueue(&self, name: &str, payload: Value) -> TaskResult<TaskId> {
        if self.inner.handler(name).is_none() {
            return Err(TaskError::UnknownTask(name.to_string()));
        }

        let sender = self.inner.sender.lock().map_err(|_| TaskError::LockPoisoned)?;
        let sender = sender.as_ref().ok_or(TaskError::NotRunning)?;

        let id = Uuid::new_v4();
        self.inner.set_status(id, TaskStatus::Pending);
        sender
            .send(Job {
                id,
                name: name.to_string(),
                payload,
            })
            .map_err(|_| TaskError::NotRunning)?;

        debug!(task_id = %id, task = name, "Task enqueued");
        Ok(id)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.inner.statuses.read().ok()?.get(&id).cloned()
    }

    /// Close the queue and wait for workers to drain it
    pub async fn shutdown(&self) {
        let sender = self.inner.sender.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let handles: Vec<JoinHandle<()>> = self
            .inner
            .workers
            .lock()
            .map(|mut w| w.drain(..).collect())
            .unwrap_or_default();

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Task worker ended abnormally");
            }
        }
        info!("Task queue stopped");
    }
}

async fn run_job(inner: &Inner, worker: usize, job: Job) {
    let Some(handler) = inner.handler(&job.name) else {
        inner.set_status(job.id, TaskStatus::Failed {
            error: format!("no handler for {}", job.name),
        });
        return;
    };

    inner.set_status(job.id, TaskStatus::Running);
    debug!(worker, task_id = %job.id, task = %job.name, "Task started");

    let status = match handler.run(job.payload).await {
        Ok(result) => TaskStatus::Succeeded { result },
        Err(error) => {
            warn!(task_id = %job.id, task = %job.name, error = %error, "Task failed");
            TaskStatus::Failed { error }
        }
    };
    inner.set_status(job.id, status);
}
