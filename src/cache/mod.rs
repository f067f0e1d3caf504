//! Cache: a thin key/value layer in front of Redis that falls back
//! transparently to per-replica in-memory maps when Redis is unreachable.
//!
//! Grounded on `RateLimiter`'s connect-or-degrade pattern: a missing or
//! broken Redis connection never becomes a hard error for a caller, only a
//! logged warning and degraded behavior.

pub mod keys;

use redis::aio::MultiplexedConnection;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppError;

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Logs a cache-layer failure through the shared error taxonomy so it carries
/// the same `errorType` label as every other degraded-but-non-fatal path,
/// without forcing callers to handle a `Result` for an operation that always
/// degrades to memory instead of failing.
fn log_degraded(context: &str, detail: impl std::fmt::Display) {
    let err = AppError::CacheDegraded(format!("{context}: {detail}"));
    tracing::warn!(error_type = err.error_type(), "{err}");
}

/// Single concrete cache component — not a trait, per design: every caller
/// wants the same "Redis first, memory fallback" behavior, so there is no
/// second implementation to abstract over.
pub struct Cache {
    redis: Arc<RwLock<Option<MultiplexedConnection>>>,
    memory: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    memory_hashes: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    memory_lists: Arc<RwLock<HashMap<String, VecDeque<String>>>>,
}

impl Cache {
    pub async fn connect(redis_url: &str) -> Self {
        let connection = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_multiplexed_tokio_connection().await {
                Ok(conn) => {
                    tracing::info!("connected to redis for cache");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "redis connection failed, using memory-only cache");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid redis url, using memory-only cache");
                None
            }
        };

        Self {
            redis: Arc::new(RwLock::new(connection)),
            memory: Arc::new(RwLock::new(HashMap::new())),
            memory_hashes: Arc::new(RwLock::new(HashMap::new())),
            memory_lists: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn redis_get(&self, key: &str) -> Option<String> {
        let mut guard = self.redis.write().await;
        let conn = guard.as_mut()?;
        match redis::cmd("GET").arg(key).query_async::<_, Option<String>>(conn).await {
            Ok(v) => v,
            Err(e) => {
                log_degraded("GET", &e);
                None
            }
        }
    }

    async fn redis_set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut guard = self.redis.write().await;
        let Some(conn) = guard.as_mut() else { return false };
        match redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(conn)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log_degraded("SET", &e);
                false
            }
        }
    }

    async fn redis_del_pattern(&self, pattern: &str) -> bool {
        let mut guard = self.redis.write().await;
        let Some(conn) = guard.as_mut() else { return false };
        let keys: Vec<String> = match redis::cmd("KEYS").arg(pattern).query_async(conn).await {
            Ok(k) => k,
            Err(e) => {
                log_degraded("KEYS", &e);
                return false;
            }
        };
        if keys.is_empty() {
            return true;
        }
        if let Err(e) = redis::cmd("DEL").arg(&keys).query_async::<_, ()>(conn).await {
            log_degraded("DEL", &e);
            return false;
        }
        true
    }

    async fn redis_hset(&self, key: &str, field: &str, value: &str) -> bool {
        let mut guard = self.redis.write().await;
        let Some(conn) = guard.as_mut() else { return false };
        match redis::cmd("HSET").arg(key).arg(field).arg(value).query_async::<_, ()>(conn).await {
            Ok(()) => true,
            Err(e) => {
                log_degraded("HSET", &e);
                false
            }
        }
    }

    async fn redis_hget(&self, key: &str, field: &str) -> Option<String> {
        let mut guard = self.redis.write().await;
        let conn = guard.as_mut()?;
        match redis::cmd("HGET").arg(key).arg(field).query_async::<_, Option<String>>(conn).await {
            Ok(v) => v,
            Err(e) => {
                log_degraded("HGET", &e);
                None
            }
        }
    }

    async fn redis_expire(&self, key: &str, ttl: Duration) -> bool {
        let mut guard = self.redis.write().await;
        let Some(conn) = guard.as_mut() else { return false };
        match redis::cmd("EXPIRE").arg(key).arg(ttl.as_secs().max(1)).query_async::<_, ()>(conn).await {
            Ok(()) => true,
            Err(e) => {
                log_degraded("EXPIRE", &e);
                false
            }
        }
    }

    async fn redis_lpush_trim(&self, key: &str, value: &str, keep: isize) -> bool {
        let mut guard = self.redis.write().await;
        let Some(conn) = guard.as_mut() else { return false };
        if let Err(e) = redis::cmd("LPUSH").arg(key).arg(value).query_async::<_, ()>(conn).await {
            log_degraded("LPUSH", &e);
            return false;
        }
        if let Err(e) = redis::cmd("LTRIM").arg(key).arg(0).arg(keep - 1).query_async::<_, ()>(conn).await {
            log_degraded("LTRIM", &e);
            return false;
        }
        true
    }

    async fn redis_lrange(&self, key: &str, start: isize, stop: isize) -> Option<Vec<String>> {
        let mut guard = self.redis.write().await;
        let conn = guard.as_mut()?;
        match redis::cmd("LRANGE").arg(key).arg(start).arg(stop).query_async::<_, Vec<String>>(conn).await {
            Ok(v) => Some(v),
            Err(e) => {
                log_degraded("LRANGE", &e);
                None
            }
        }
    }

    fn memory_sweep(memory: &mut HashMap<String, MemoryEntry>) {
        let now = Instant::now();
        memory.retain(|_, v| v.expires_at > now);
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(raw) = self.redis_get(key).await {
            return serde_json::from_str(&raw).ok();
        }
        let mut memory = self.memory.write().await;
        Self::memory_sweep(&mut memory);
        memory.get(key).and_then(|e| serde_json::from_str(&e.value).ok())
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(raw) = serde_json::to_string(value) else { return };
        if self.redis_set(key, &raw, ttl).await {
            return;
        }
        let mut memory = self.memory.write().await;
        memory.insert(key.to_string(), MemoryEntry { value: raw, expires_at: Instant::now() + ttl });
    }

    pub async fn del(&self, key: &str) {
        {
            let mut guard = self.redis.write().await;
            if let Some(conn) = guard.as_mut() {
                let _: Result<(), _> = redis::cmd("DEL").arg(key).query_async(conn).await;
            }
        }
        self.memory.write().await.remove(key);
    }

    /// Deletes every key matching `pattern`. Used only for the summary-cache
    /// bulk purge after a successful payment write and for the health-cache
    /// administrative reset.
    pub async fn del_pattern(&self, pattern: &str) {
        let redis_ok = self.redis_del_pattern(pattern).await;
        let prefix = pattern.trim_end_matches('*');
        if !redis_ok {
            self.memory.write().await.retain(|k, _| !k.starts_with(prefix));
        }
        self.memory_hashes.write().await.retain(|k, _| !k.starts_with(prefix));
        self.memory_lists.write().await.retain(|k, _| !k.starts_with(prefix));
    }

    pub async fn is_connected(&self) -> bool {
        self.redis.read().await.is_some()
    }

    /// Sets a field on a hash key. Used for `health:cache` and
    /// `health:last_check`, both keyed by processor name.
    pub async fn hset(&self, key: &str, field: &str, value: &str) {
        if self.redis_hset(key, field, value).await {
            return;
        }
        let mut hashes = self.memory_hashes.write().await;
        hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_string());
    }

    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        if let Some(v) = self.redis_hget(key, field).await {
            return Some(v);
        }
        let hashes = self.memory_hashes.read().await;
        hashes.get(key).and_then(|h| h.get(field)).cloned()
    }

    /// Best-effort TTL on a key. The in-memory fallback has no per-hash/list
    /// expiry clock (unlike `set`'s per-entry `Instant`), so this only takes
    /// effect against Redis; memory-fallback data is bounded instead by
    /// `del_pattern` on the next bulk invalidation and by `ltrim`'s cap.
    pub async fn expire(&self, key: &str, ttl: Duration) {
        self.redis_expire(key, ttl).await;
    }

    /// Pushes `value` onto the front of the list at `key`, then trims it to
    /// the last `keep` entries. Used for `health:response_times:{processor}`.
    pub async fn lpush_capped(&self, key: &str, value: &str, keep: usize) {
        if self.redis_lpush_trim(key, value, keep as isize).await {
            return;
        }
        let mut lists = self.memory_lists.write().await;
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        list.truncate(keep);
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        if let Some(v) = self.redis_lrange(key, start, stop).await {
            return v;
        }
        let lists = self.memory_lists.read().await;
        let Some(list) = lists.get(key) else { return Vec::new() };
        let len = list.len() as isize;
        let normalize = |i: isize| -> usize {
            let i = if i < 0 { (len + i).max(0) } else { i.min(len) };
            i as usize
        };
        let (s, e) = (normalize(start), normalize(stop + 1));
        if s >= e {
            return Vec::new();
        }
        list.iter().skip(s).take(e - s).cloned().collect()
    }
}
