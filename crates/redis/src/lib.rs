//! Redis backend for the convoy job queue.
//!
//! Every multi-step transition runs as a single Lua script or an atomic
//! pipeline, so concurrent workers in any number of processes observe each
//! one as indivisible.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use convoy_core::{Client, ConvoyConfig};
//! use convoy_redis::RedisBackend;
//!
//! #[tokio::main]
//! async fn main() -> convoy_core::Result<()> {
//!     let config = ConvoyConfig::new("redis://localhost");
//!     let backend = RedisBackend::from_config(&config).await?;
//!     let client = Client::new(backend, config);
//!     client.enqueue("orders", r#"{"sku":"A1"}"#).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use convoy_core::{
    retention_millis, Backend, ConvoyConfig, ConvoyError, Item, QueueKeys, QueueSet, Result,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

/// Pop the oldest pending id into processing.
///
/// KEYS: pending, processing. ARGV: now.
const CLAIM_NEXT: &str = r#"
local ids = redis.call('ZRANGE', KEYS[1], 0, 0)
if #ids == 0 then
    return false
end
redis.call('ZREM', KEYS[1], ids[1])
redis.call('ZADD', KEYS[2], ARGV[1], ids[1])
return ids[1]
"#;

/// Move one id from pending to processing, if it is pending.
///
/// KEYS: pending, processing. ARGV: id, now.
const CLAIM_ONE: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

/// KEYS: item.
const INCREMENT_ATTEMPTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call('HINCRBY', KEYS[1], 'attempts', 1)
"#;

/// KEYS: processing, success, item. ARGV: id, now, retention ms.
const RECORD_SUCCESS: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
if redis.call('EXISTS', KEYS[3]) == 1 then
    redis.call('HSET', KEYS[3], 'outcome', 'success')
    redis.call('PEXPIRE', KEYS[3], ARGV[3])
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

/// KEYS: processing, error, item. ARGV: id, now, message, retention ms.
const RECORD_FAILURE: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
if redis.call('EXISTS', KEYS[3]) == 1 then
    local errors = {}
    local raw = redis.call('HGET', KEYS[3], 'errors')
    if raw then
        local ok, decoded = pcall(cjson.decode, raw)
        if ok and type(decoded) == 'table' then
            errors = decoded
        end
    end
    table.insert(errors, ARGV[3])
    redis.call('HSET', KEYS[3], 'outcome', 'error', 'errors', cjson.encode(errors))
    redis.call('PEXPIRE', KEYS[3], ARGV[4])
end
return 1
"#;

/// KEYS: error, pending, item. ARGV: id, now.
const RETRY: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
if redis.call('EXISTS', KEYS[3]) == 1 then
    redis.call('PERSIST', KEYS[3])
    redis.call('HSET', KEYS[3], 'outcome', 'pending')
end
return 1
"#;

/// KEYS: processing, pending. ARGV: id, now.
const REQUEUE: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

fn backend_err(e: redis::RedisError) -> ConvoyError {
    ConvoyError::Backend(e.to_string())
}

/// Redis backend for queue storage.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the Redis server at `redis_url`.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(backend_err)?;
        let conn = ConnectionManager::new(client).await.map_err(backend_err)?;
        tracing::debug!(url = %redis_url, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Connect using the store URL from `config`.
    pub async fn from_config(config: &ConvoyConfig) -> Result<Self> {
        Self::new(config.require_url()?).await
    }

    /// Create a new Redis backend with an existing connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Backend for RedisBackend {
    // ========== Records ==========

    async fn insert_item(&self, item: &Item) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(item.queue.as_str());
        let fields = item.to_fields()?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(keys.item(item.id.as_str()), fields.as_slice())
            .zadd(keys.pending(), item.id.as_str(), item.created);

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn load_item(&self, queue: &str, id: &str) -> Result<Option<HashMap<String, String>>> {
        let mut conn = self.conn.clone();
        let record: HashMap<String, String> = conn
            .hgetall(QueueKeys::new(queue).item(id))
            .await
            .map_err(backend_err)?;

        // HGETALL on a missing key is an empty hash.
        if record.is_empty() {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }

    async fn increment_attempts(&self, queue: &str, id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let attempts: Option<i64> = redis::Script::new(INCREMENT_ATTEMPTS)
            .key(QueueKeys::new(queue).item(id))
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(attempts)
    }

    async fn destroy(&self, queue: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for set in QueueSet::ALL {
            pipe.zrem(keys.set(set), id);
        }
        pipe.del(keys.item(id));

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    // ========== Claim Protocol ==========

    async fn claim_next(&self, queue: &str, now: i64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let claimed: Option<String> = redis::Script::new(CLAIM_NEXT)
            .key(keys.pending())
            .key(keys.processing())
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(claimed)
    }

    async fn claim(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let claimed: i32 = redis::Script::new(CLAIM_ONE)
            .key(keys.pending())
            .key(keys.processing())
            .arg(id)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(claimed == 1)
    }

    // ========== Completion ==========

    async fn complete_success(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        retention: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let recorded: i32 = redis::Script::new(RECORD_SUCCESS)
            .key(keys.processing())
            .key(keys.success())
            .key(keys.item(id))
            .arg(id)
            .arg(now)
            .arg(retention_millis(retention))
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(recorded == 1)
    }

    async fn complete_failure(
        &self,
        queue: &str,
        id: &str,
        now: i64,
        message: &str,
        retention: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let recorded: i32 = redis::Script::new(RECORD_FAILURE)
            .key(keys.processing())
            .key(keys.error())
            .key(keys.item(id))
            .arg(id)
            .arg(now)
            .arg(message)
            .arg(retention_millis(retention))
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(recorded == 1)
    }

    // ========== Recovery ==========

    async fn requeue_processing(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let moved: i32 = redis::Script::new(REQUEUE)
            .key(keys.processing())
            .key(keys.pending())
            .arg(id)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(moved == 1)
    }

    async fn retry_failed(&self, queue: &str, id: &str, now: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let keys = QueueKeys::new(queue);

        let moved: i32 = redis::Script::new(RETRY)
            .key(keys.error())
            .key(keys.pending())
            .key(keys.item(id))
            .arg(id)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(moved == 1)
    }

    // ========== Set Queries ==========

    async fn set_len(&self, queue: &str, set: QueueSet) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .zcard(QueueKeys::new(queue).set(set))
            .await
            .map_err(backend_err)?;
        Ok(len)
    }

    async fn range_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(QueueKeys::new(queue).set(set), "-inf", max)
            .await
            .map_err(backend_err)?;
        Ok(ids)
    }

    async fn remove_to(&self, queue: &str, set: QueueSet, max: i64) -> Result<usize> {
        let mut conn = self.conn.clone();
        let removed: usize = conn
            .zrembyscore(QueueKeys::new(queue).set(set), "-inf", max)
            .await
            .map_err(backend_err)?;
        Ok(removed)
    }

    async fn score(&self, queue: &str, set: QueueSet, id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn
            .zscore(QueueKeys::new(queue).set(set), id)
            .await
            .map_err(backend_err)?;
        Ok(score.map(|s| s as i64))
    }
}


// ========== Integration Tests (require Redis) ==========
