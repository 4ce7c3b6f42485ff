//! Backend abstraction for queue storage.
//!
//! A backend owns the key-space described by [`QueueKeys`] and must make
//! every multi-step operation below indivisible with respect to all other
//! operations on the same queue. The claim methods in particular must never
//! be split into a read followed by a separate write.
//!
//! [`QueueKeys`]: crate::keys::QueueKeys

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::item::Item;
use crate::keys::QueueSet;

/// Backend trait for queue storage operations.
///
/// Implementations must be thread-safe (Send + Sync). All timestamps are
/// milliseconds since the Unix epoch and all score bounds are inclusive.
#[async_trait]
pub trait Backend: Send + Sync {
    // ========== Records ==========

    /// Write the item record and add its id to the pending set (score =
    /// `item.created`) as one atomic unit.
    async fn insert_item(&self, item: &Item) -> Result<()>;

    /// Read every field of an item record. `None` if the record is absent.
    async fn load_item(&self, queue: &str, id: &str) -> Result<Option<HashMap<String, String>>>;

    /// Increment the `attempts` field of an existing record.
    ///
    /// Returns the new value, or `None` if the record does not exist. Must
    /// not create a record.
    async fn increment_attempts(&self, queue: &str, id: &str) -> Result<Option<i64>>;

    /// Remove the id from all four sets and delete its record.
    async fn destroy(&self, queue: &str, id: &str) -> Result<()>;

    // ========== Claim Protocol ==========

    /// Pop the lowest-scored pending id into the processing set with score
    /// `now`. Returns `None` when nothing is pending.
    async fn claim_next(&self, queue: &str, now: i64) -> Result<Option<String>>;

    /// Move `id` from pending to processing with score `now`.
    ///
    /// Returns `false` if the id was not pending. Of any number of
    /// concurrent callers for the same id, at most one sees `true`.
    async fn claim(&self, queue: &str, id: &str, now: i64) -> Result<bool>;

    // ========== Completion ==========

    /// Remove the id from processing, mark the record successful, apply the
    /// retention TTL and add the id to the success log with score `now`.
    ///
    /// Returns `false` (and changes nothing) if the id was no longer in
    /// processing, i.e. it was destroyed or requeued while its executor ran.
    async fn complete_success(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        retention: Duration,
    ) -> Result<bool>;

    /// Remove the id from processing, add it to the error log with score
    /// `now`, append `message` to the record's error list, mark the record
    /// failed and apply the retention TTL.
    ///
    /// Returns `false` (and changes nothing) if the id was no longer in
    /// processing.
    async fn complete_failure(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        message: &str,
        retention: Duration,
    ) -> Result<bool>;

    // ========== Recovery ==========

    /// Move the id from processing back to pending with score `now`.
    ///
    /// Returns `false` (and changes nothing) if the id was no longer in
    /// processing.
    async fn requeue_processing(&self, queue: &str, id: &str, now: i64) -> Result<bool>;

    /// Move the id from the error log back to pending with score `now`,
    /// clear the record's TTL and reset its outcome to pending.
    ///
    /// Returns `false` (and changes nothing) if the id was not in the error
    /// log.
    async fn retry_failed(&self, queue: &str, id: &str, now: i64) -> Result<bool>;

    // ========== Set Queries ==========

    /// Number of ids in a set.
    async fn set_len(&self, queue: &str, set: QueueSet) -> Result<usize>;

    /// Ids in a set with score <= `max`, lowest score first.
    async fn range_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<Vec<String>>;

    /// Remove ids with score <= `max` from a set. Returns the number removed.
    async fn remove_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<usize>;

    /// Score of `id` in a set, if it is a member.
    async fn score(&self, queue: &str, set: QueueSet, id: &str) -> Result<Option<i64>>;
}

/// A type-erased backend that can be shared across threads.
pub type DynBackend = Arc<dyn Backend>;

/// Wrapper around Arc<dyn Backend> for convenience.
#[derive(Clone)]
pub struct SharedBackend {
    inner: DynBackend,
}

impl SharedBackend {
    /// Create a new SharedBackend from any Backend implementation.
    pub fn new<B: Backend + 'static>(backend: B) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    /// Get a reference to the inner backend.
    pub fn inner(&self) -> &DynBackend {
        &self.inner
    }
}

#[async_trait]
impl Backend for SharedBackend {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        self.inner.insert_item(item).await
    }

    async fn load_item(&self, queue: &str, id: &str) -> Result<Option<HashMap<String, String>>> {
        self.inner.load_item(queue, id).await
    }

    async fn increment_attempts(&self, queue: &str, id: &str) -> Result<Option<i64>> {
        self.inner.increment_attempts(queue, id).await
    }

    async fn destroy(&self, queue: &str, id: &str) -> Result<()> {
        self.inner.destroy(queue, id).await
    }

    async fn claim_next(&self, queue: &str, now: i64) -> Result<Option<String>> {
        self.inner.claim_next(queue, now).await
    }

    async fn claim(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        self.inner.claim(queue, id, now).await
    }

    async fn complete_success(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        retention: Duration,
    ) -> Result<bool> {
        self.inner.complete_success(queue, id, now, retention).await
    }

    async fn complete_failure(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        message: &str,
        retention: Duration,
    ) -> Result<bool> {
        self.inner
            .complete_failure(queue, id, now, message, retention)
            .await
    }

    async fn requeue_processing(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        self.inner.requeue_processing(queue, id, now).await
    }

    async fn retry_failed(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        self.inner.retry_failed(queue, id, now).await
    }

    async fn set_len(&self, queue: &str, set: QueueSet) -> Result<usize> {
        self.inner.set_len(queue, set).await
    }

    async fn range_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<Vec<String>> {
        self.inner.range_to(queue, set, max).await
    }

    async fn remove_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<usize> {
        self.inner.remove_to(queue, set, max).await
    }

    async fn score(&self, queue: &str, set: QueueSet, id: &str) -> Result<Option<i64>> {
        self.inner.score(queue, set, id).await
    }
}
