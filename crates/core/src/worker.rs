//! Task executor contract and the polling worker loop.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, SharedBackend};
use crate::client::{Client, Processed};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::item::Item;

/// Result type for task executors.
pub type TaskResult = std::result::Result<(), TaskError>;

/// Failure reported by a task executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    /// Error message, appended to the item's error list.
    pub message: String,
}

impl TaskError {
    /// Create a new task error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error recorded when an executor fails without saying why.
    pub fn generic() -> Self {
        Self::new("generic processing failure")
    }

    /// The message to record. Never empty.
    pub fn detail(&self) -> &str {
        if self.message.is_empty() {
            "generic processing failure"
        } else {
            &self.message
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.detail())
    }
}

impl<E: std::error::Error> From<E> for TaskError {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

/// Turn a plain success flag into a [`TaskResult`].
pub fn verdict(succeeded: bool) -> TaskResult {
    if succeeded {
        Ok(())
    } else {
        Err(TaskError::generic())
    }
}

/// Worker that keeps taking items from one queue until stopped.
///
/// Any number of workers, in any number of processes, may run against the
/// same queue; the claim protocol keeps them from sharing an item.
pub struct Worker<F, Fut, B = SharedBackend>
where
    F: Fn(Item) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
    B: Backend + Clone + 'static,
{
    id: String,
    client: Client<B>,
    config: WorkerConfig,
    handler: F,
    running: Arc<AtomicBool>,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut, B> Worker<F, Fut, B>
where
    F: Fn(Item) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
    B: Backend + Clone + 'static,
{
    /// Create a new worker. It runs until `running` is cleared.
    pub fn new(client: Client<B>, config: WorkerConfig, handler: F, running: Arc<AtomicBool>) -> Self {
        Self {
            id: generate_worker_id(),
            client,
            config,
            handler,
            running,
            _phantom: PhantomData,
        }
    }

    /// This worker's identifier, used in log output.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the worker loop.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(worker_id = %self.id, queue = %self.config.queue, "Worker started");

        while self.running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(Processed::Idle) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(processed) => {
                    tracing::trace!(worker_id = %self.id, outcome = ?processed, "Item processed");
                }
                Err(e) => {
                    tracing::error!(worker_id = %self.id, error = %e, "Worker error");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }

        tracing::info!(worker_id = %self.id, queue = %self.config.queue, "Worker stopped");
        Ok(())
    }

    /// Process at most one item.
    pub async fn tick(&self) -> Result<Processed> {
        self.client
            .process_next(&self.config.queue, self.handler.clone())
            .await
    }
}

/// Generate a worker identifier from host, process and time.
pub fn generate_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let pid = std::process::id();
    format!("{}-{}-{}", host, pid, crate::item::now_millis())
}
