//! Queue lifecycle engine.
//!
//! [`Client`] drives items through pending → processing → success/error and
//! back. It holds no locks and no mutable state: every transition that other
//! workers must observe atomically is a single [`Backend`] call.

use serde::Serialize;
use std::future::Future;

use crate::backend::{Backend, SharedBackend};
use crate::config::ConvoyConfig;
use crate::error::{ConvoyError, Result};
use crate::item::{now_millis, Item, ItemId};
use crate::keys::QueueSet;
use crate::worker::{TaskError, TaskResult};

/// What a `process_*` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Nothing was claimed; the executor did not run.
    Idle,
    /// The executor ran and succeeded.
    Succeeded(ItemId),
    /// The item was claimed but did not succeed: the executor failed or
    /// panicked, or the record had vanished before it could run.
    Failed(ItemId),
}

impl Processed {
    /// Whether the executor ran and succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Processed::Succeeded(_))
    }

    /// Whether nothing was claimed.
    pub fn is_idle(&self) -> bool {
        matches!(self, Processed::Idle)
    }

    /// The claimed item's id, unless idle.
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            Processed::Idle => None,
            Processed::Succeeded(id) | Processed::Failed(id) => Some(id),
        }
    }
}

/// Client for enqueueing, processing and inspecting items.
#[derive(Clone)]
pub struct Client<B: Backend + Clone = SharedBackend> {
    backend: B,
    config: ConvoyConfig,
}

impl Client<SharedBackend> {
    /// Create a new client with a shared backend.
    pub fn new(backend: impl Backend + 'static, config: ConvoyConfig) -> Self {
        Self {
            backend: SharedBackend::new(backend),
            config,
        }
    }
}

impl<B: Backend + Clone> Client<B> {
    /// Create a new client with a specific backend.
    pub fn with_backend(backend: B, config: ConvoyConfig) -> Self {
        Self { backend, config }
    }

    /// The backend this client talks to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ConvoyConfig {
        &self.config
    }

    /// Add an item to the named queue.
    ///
    /// `meta` is stored as-is and handed back to the executor untouched.
    pub async fn enqueue(&self, queue: &str, meta: impl Into<String>) -> Result<ItemId> {
        let item = Item::new(queue, meta);
        self.backend.insert_item(&item).await?;

        tracing::debug!(queue = %queue, item_id = %item.id, "Item enqueued");
        Ok(item.id)
    }

    /// Add an item whose meta is `payload` serialized as JSON.
    pub async fn enqueue_json<T: Serialize>(&self, queue: &str, payload: &T) -> Result<ItemId> {
        let meta = serde_json::to_string(payload)?;
        self.enqueue(queue, meta).await
    }

    /// Load an item. `None` if it never existed, was destroyed, expired, or
    /// its record is unreadable.
    pub async fn status(&self, queue: &str, id: &str) -> Result<Option<Item>> {
        let Some(record) = self.backend.load_item(queue, id).await? else {
            return Ok(None);
        };
        if record.is_empty() {
            return Ok(None);
        }

        match Item::from_fields(&record) {
            Ok(item) => Ok(Some(item)),
            Err(ConvoyError::MalformedItem(reason)) => {
                tracing::warn!(queue = %queue, item_id = %id, reason = %reason, "Ignoring malformed item record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Claim the oldest pending item of the queue and run `executor` on it.
    pub async fn process_next<F, Fut>(&self, queue: &str, executor: F) -> Result<Processed>
    where
        F: FnOnce(Item) -> Fut + Send,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        match self.backend.claim_next(queue, now_millis()).await? {
            Some(id) => self.run_task(queue, ItemId::from(id), executor).await,
            None => Ok(Processed::Idle),
        }
    }

    /// Claim one specific pending item and run `executor` on it.
    ///
    /// Returns [`Processed::Idle`] without running the executor if the item
    /// is not pending: already claimed, completed, or unknown.
    pub async fn process_one<F, Fut>(&self, queue: &str, id: &str, executor: F) -> Result<Processed>
    where
        F: FnOnce(Item) -> Fut + Send,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        if self.backend.claim(queue, id, now_millis()).await? {
            self.run_task(queue, ItemId::from(id), executor).await
        } else {
            Ok(Processed::Idle)
        }
    }

    async fn run_task<F, Fut>(&self, queue: &str, id: ItemId, executor: F) -> Result<Processed>
    where
        F: FnOnce(Item) -> Fut + Send,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let item = match self.backend.increment_attempts(queue, id.as_str()).await? {
            Some(_) => self.status(queue, id.as_str()).await?,
            None => None,
        };

        let Some(item) = item else {
            // Nothing to run. Drop the id so `requeue` doesn't keep reviving it.
            tracing::warn!(queue = %queue, item_id = %id, "Claimed item has no usable record, discarding");
            self.backend.destroy(queue, id.as_str()).await?;
            return Ok(Processed::Failed(id));
        };

        tracing::debug!(queue = %queue, item_id = %id, attempts = item.attempts, "Processing item");

        // Own task so a panicking executor is recorded as a failure.
        let verdict = match tokio::spawn(executor(item)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::new(format!(
                "executor panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(TaskError::new(format!("executor aborted: {}", e))),
        };

        let now = now_millis();
        let retention = self.config.retention;
        let recorded = match &verdict {
            Ok(()) => {
                tracing::debug!(queue = %queue, item_id = %id, "Item succeeded");
                self.backend
                    .complete_success(queue, id.as_str(), now, retention)
                    .await?
            }
            Err(err) => {
                tracing::debug!(queue = %queue, item_id = %id, error = %err, "Item failed");
                self.backend
                    .complete_failure(queue, id.as_str(), now, err.detail(), retention)
                    .await?
            }
        };

        if !recorded {
            // Destroyed or requeued while the executor ran.
            tracing::warn!(queue = %queue, item_id = %id, "Item left processing before completion, outcome not recorded");
        }

        match verdict {
            Ok(()) => Ok(Processed::Succeeded(id)),
            Err(_) => Ok(Processed::Failed(id)),
        }
    }

    /// Move processing items claimed at or before `cutoff` (ms timestamp,
    /// default now) back to pending. Returns how many were moved.
    pub async fn requeue(&self, queue: &str, cutoff: Option<i64>) -> Result<usize> {
        let cutoff = cutoff.unwrap_or_else(now_millis);
        let stuck = self
            .backend
            .range_to(queue, QueueSet::Processing, cutoff)
            .await?;

        let mut moved = 0;
        for id in &stuck {
            // Completed since the scan? Then it's no longer ours to move.
            if self
                .backend
                .requeue_processing(queue, id, now_millis())
                .await?
            {
                moved += 1;
            }
        }

        if moved > 0 {
            tracing::info!(queue = %queue, cutoff = cutoff, moved = moved, "Requeued stuck items");
        }
        Ok(moved)
    }

    /// Send a failed item back to pending. Attempts and past errors are kept.
    ///
    /// Returns `false` if the item was not in the error log.
    pub async fn retry(&self, queue: &str, id: &str) -> Result<bool> {
        let moved = self.backend.retry_failed(queue, id, now_millis()).await?;
        tracing::debug!(queue = %queue, item_id = %id, moved = moved, "Retry requested");
        Ok(moved)
    }

    /// Remove an item from every set and delete its record.
    pub async fn destroy(&self, queue: &str, id: &str) -> Result<()> {
        self.backend.destroy(queue, id).await?;
        tracing::debug!(queue = %queue, item_id = %id, "Item destroyed");
        Ok(())
    }

    /// Number of entries in the success log.
    pub async fn count_successes(&self, queue: &str) -> Result<usize> {
        self.backend.set_len(queue, QueueSet::Success).await
    }

    /// Number of entries in the error log.
    pub async fn count_errors(&self, queue: &str) -> Result<usize> {
        self.backend.set_len(queue, QueueSet::Error).await
    }

    /// Ids that succeeded at or before `before` (default now), oldest first.
    ///
    /// Records of listed ids may already have expired.
    pub async fn report_successes(&self, queue: &str, before: Option<i64>) -> Result<Vec<ItemId>> {
        self.report(queue, QueueSet::Success, before).await
    }

    /// Ids that failed at or before `before` (default now), oldest first.
    pub async fn report_errors(&self, queue: &str, before: Option<i64>) -> Result<Vec<ItemId>> {
        self.report(queue, QueueSet::Error, before).await
    }

    /// Trim success log entries at or before `before` (default now).
    pub async fn clear_successes(&self, queue: &str, before: Option<i64>) -> Result<usize> {
        self.clear(queue, QueueSet::Success, before).await
    }

    /// Trim error log entries at or before `before` (default now).
    pub async fn clear_errors(&self, queue: &str, before: Option<i64>) -> Result<usize> {
        self.clear(queue, QueueSet::Error, before).await
    }

    /// Number of items waiting to be claimed.
    pub async fn pending_len(&self, queue: &str) -> Result<usize> {
        self.backend.set_len(queue, QueueSet::Pending).await
    }

    /// Number of items currently claimed.
    pub async fn processing_len(&self, queue: &str) -> Result<usize> {
        self.backend.set_len(queue, QueueSet::Processing).await
    }

    async fn report(&self, queue: &str, set: QueueSet, before: Option<i64>) -> Result<Vec<ItemId>> {
        let ids = self
            .backend
            .range_to(queue, set, before.unwrap_or_else(now_millis))
            .await?;
        Ok(ids.into_iter().map(ItemId::from).collect())
    }

    async fn clear(&self, queue: &str, set: QueueSet, before: Option<i64>) -> Result<usize> {
        let removed = self
            .backend
            .remove_to(queue, set, before.unwrap_or_else(now_millis))
            .await?;
        tracing::debug!(queue = %queue, set = ?set, removed = removed, "Log trimmed");
        Ok(removed)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
