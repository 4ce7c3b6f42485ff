//! In-memory backend.
//!
//! Mirrors the Redis key-space with plain collections behind a single
//! mutex, so every trait method is one critical section and therefore as
//! atomic as its Redis counterpart. Useful for tests and single-process
//! deployments.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::config::retention_millis;
use crate::error::Result;
use crate::item::{fields, now_millis, Item, Outcome};
use crate::keys::{QueueKeys, QueueSet};

/// Sorted set ordered by (score, member), like a Redis ZSET.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn first(&self) -> Option<&str> {
        self.ordered.iter().next().map(|(_, member)| member.as_str())
    }

    fn range_to(&self, max: i64) -> Vec<String> {
        self.ordered
            .iter()
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn score(&self, member: &str) -> Option<i64> {
        self.scores.get(member).copied()
    }
}

#[derive(Debug)]
struct Record {
    fields: HashMap<String, String>,
    /// Eviction deadline in ms; `None` means persistent.
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    sets: HashMap<String, SortedSet>,
    records: HashMap<String, Record>,
}

impl State {
    fn set_mut(&mut self, key: String) -> &mut SortedSet {
        self.sets.entry(key).or_default()
    }

    fn remove_member(&mut self, key: &str, member: &str) -> bool {
        self.sets
            .get_mut(key)
            .map(|set| set.remove(member))
            .unwrap_or(false)
    }

    /// Look up a record, evicting it first if its TTL has run out.
    fn record_mut(&mut self, key: &str) -> Option<&mut Record> {
        let expired = matches!(
            self.records.get(key),
            Some(Record { expires_at: Some(at), .. }) if *at <= now_millis()
        );
        if expired {
            self.records.remove(key);
        }
        self.records.get_mut(key)
    }
}

fn expiry(retention: Duration) -> Option<i64> {
    Some(now_millis().saturating_add(retention_millis(retention)))
}

/// In-memory backend for queue storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an item record with raw fields, bypassing encoding.
    #[cfg(test)]
    pub(crate) async fn write_raw_record(
        &self,
        queue: &str,
        id: &str,
        record: HashMap<String, String>,
    ) {
        let key = QueueKeys::new(queue).item(id);
        self.state.lock().await.records.insert(
            key,
            Record {
                fields: record,
                expires_at: None,
            },
        );
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        let keys = QueueKeys::new(item.queue.as_str());
        let fields = item
            .to_fields()?
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        let mut state = self.state.lock().await;
        state.records.insert(
            keys.item(item.id.as_str()),
            Record {
                fields,
                expires_at: None,
            },
        );
        state
            .set_mut(keys.pending())
            .insert(item.id.as_str(), item.created);
        Ok(())
    }

    async fn load_item(&self, queue: &str, id: &str) -> Result<Option<HashMap<String, String>>> {
        let key = QueueKeys::new(queue).item(id);
        let mut state = self.state.lock().await;
        Ok(state.record_mut(&key).map(|record| record.fields.clone()))
    }

    async fn increment_attempts(&self, queue: &str, id: &str) -> Result<Option<i64>> {
        let key = QueueKeys::new(queue).item(id);
        let mut state = self.state.lock().await;
        let Some(record) = state.record_mut(&key) else {
            return Ok(None);
        };

        let attempts = record
            .fields
            .get(fields::ATTEMPTS)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        record
            .fields
            .insert(fields::ATTEMPTS.to_string(), attempts.to_string());
        Ok(Some(attempts))
    }

    async fn destroy(&self, queue: &str, id: &str) -> Result<()> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;
        for set in QueueSet::ALL {
            state.remove_member(&keys.set(set), id);
        }
        state.records.remove(&keys.item(id));
        Ok(())
    }

    async fn claim_next(&self, queue: &str, now: i64) -> Result<Option<String>> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        let pending = keys.pending();
        let Some(id) = state
            .sets
            .get(&pending)
            .and_then(|set| set.first())
            .map(str::to_string)
        else {
            return Ok(None);
        };

        state.remove_member(&pending, &id);
        state.set_mut(keys.processing()).insert(&id, now);
        Ok(Some(id))
    }

    async fn claim(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        if !state.remove_member(&keys.pending(), id) {
            return Ok(false);
        }
        state.set_mut(keys.processing()).insert(id, now);
        Ok(true)
    }

    async fn complete_success(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        retention: Duration,
    ) -> Result<bool> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        if !state.remove_member(&keys.processing(), id) {
            return Ok(false);
        }
        if let Some(record) = state.record_mut(&keys.item(id)) {
            record.fields.insert(
                fields::OUTCOME.to_string(),
                Outcome::Success.as_str().to_string(),
            );
            record.expires_at = expiry(retention);
        }
        state.set_mut(keys.success()).insert(id, now);
        Ok(true)
    }

    async fn complete_failure(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        message: &str,
        retention: Duration,
    ) -> Result<bool> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        if !state.remove_member(&keys.processing(), id) {
            return Ok(false);
        }
        state.set_mut(keys.error()).insert(id, now);
        if let Some(record) = state.record_mut(&keys.item(id)) {
            let mut errors: Vec<String> = record
                .fields
                .get(fields::ERRORS)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();
            errors.push(message.to_string());

            record
                .fields
                .insert(fields::ERRORS.to_string(), serde_json::to_string(&errors)?);
            record.fields.insert(
                fields::OUTCOME.to_string(),
                Outcome::Error.as_str().to_string(),
            );
            record.expires_at = expiry(retention);
        }
        Ok(true)
    }

    async fn requeue_processing(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        if !state.remove_member(&keys.processing(), id) {
            return Ok(false);
        }
        state.set_mut(keys.pending()).insert(id, now);
        Ok(true)
    }

    async fn retry_failed(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let keys = QueueKeys::new(queue);
        let mut state = self.state.lock().await;

        if !state.remove_member(&keys.error(), id) {
            return Ok(false);
        }
        state.set_mut(keys.pending()).insert(id, now);
        if let Some(record) = state.record_mut(&keys.item(id)) {
            record.expires_at = None;
            record.fields.insert(
                fields::OUTCOME.to_string(),
                Outcome::Pending.as_str().to_string(),
            );
        }
        Ok(true)
    }

    async fn set_len(&self, queue: &str, set: QueueSet) -> Result<usize> {
        let key = QueueKeys::new(queue).set(set);
        let state = self.state.lock().await;
        Ok(state.sets.get(&key).map(SortedSet::len).unwrap_or(0))
    }

    async fn range_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<Vec<String>> {
        let key = QueueKeys::new(queue).set(set);
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(&key)
            .map(|s| s.range_to(max))
            .unwrap_or_default())
    }

    async fn remove_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<usize> {
        let key = QueueKeys::new(queue).set(set);
        let mut state = self.state.lock().await;
        let Some(sorted) = state.sets.get_mut(&key) else {
            return Ok(0);
        };

        let doomed = sorted.range_to(max);
        for member in &doomed {
            sorted.remove(member);
        }
        Ok(doomed.len())
    }

    async fn score(&self, queue: &str, set: QueueSet, id: &str) -> Result<Option<i64>> {
        let key = QueueKeys::new(queue).set(set);
        let state = self.state.lock().await;
        Ok(state.sets.get(&key).and_then(|s| s.score(id)))
    }
}
