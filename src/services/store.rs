use crate::config::Environment;
use crate::error::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Shared string store. Every conditional operation is atomic, which is what
/// the anti-replay gate and the rate limiter rely on across instances.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `false` without writing when the key already exists.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Increments a counter that expires `window` after its first increment.
    async fn increment_window(&self, key: &str, window: Duration) -> Result<u64>;

    async fn ping(&self) -> bool;
}

impl dyn KeyValueStore {
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.set(key, &serialized).await
    }

    pub async fn set_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        let serialized = serde_json::to_string(value)?;
        self.set_if_absent(key, &serialized).await
    }
}

pub struct RedisStore {
    redis: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_connection_manager().await?;
        tracing::info!("Redis connected successfully");
        Ok(Self { redis })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut redis = self.redis.clone();
        Ok(redis.get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        redis.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut redis = self.redis.clone();
        Ok(redis.set_nx::<_, _, bool>(key, value).await?)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut redis = self.redis.clone();
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut redis)
            .await?;
        Ok(removed > 0)
    }

    async fn increment_window(&self, key: &str, window: Duration) -> Result<u64> {
        let mut redis = self.redis.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window.as_secs().max(1))
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .query_async(&mut redis)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> bool {
        let mut redis = self.redis.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut redis)
            .await
            .is_ok()
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    /// Expiry deadlines, soonest first. Stale heap items are skipped on pop.
    expiries: BinaryHeap<Reverse<(Instant, String)>>,
}

impl MemoryState {
    /// Drops every entry whose deadline has passed.
    fn purge_expired(&mut self, now: Instant) {
        while self
            .expiries
            .peek()
            .is_some_and(|Reverse((at, _))| *at <= now)
        {
            let Some(Reverse((at, key))) = self.expiries.pop() else {
                break;
            };
            if self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == Some(at))
            {
                self.entries.remove(&key);
            }
        }
    }

    fn insert(&mut self, key: &str, value: String, expires_at: Option<Instant>) {
        if let Some(at) = expires_at {
            self.expiries.push(Reverse((at, key.to_string())));
        }
        self.entries
            .insert(key.to_string(), MemoryEntry { value, expires_at });
    }
}

/// Process-local store for development and tests. Not shared between
/// instances, so replay protection only holds within one process.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(state
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.purge_expired(Instant::now());
        state.insert(key, value.to_string(), None);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.purge_expired(Instant::now());
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.insert(key, value.to_string(), None);
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state
            .entries
            .get(key)
            .is_some_and(|entry| entry.value == expected)
        {
            state.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn increment_window(&self, key: &str, window: Duration) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.purge_expired(now);

        let incremented = state.entries.get_mut(key).map(|entry| {
            let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
            entry.value = count.to_string();
            count
        });

        match incremented {
            Some(count) => Ok(count),
            None => {
                state.insert(key, "1".to_string(), Some(now + window));
                Ok(1)
            }
        }
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Opens Redis when configured. Outside production an unreachable or
/// missing Redis degrades to the in-memory store.
pub async fn connect(
    redis_url: Option<&str>,
    environment: Environment,
) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let Some(url) = redis_url else {
        tracing::warn!("REDIS_URL not set, using memory store only");
        return Ok(Arc::new(MemoryStore::new()));
    };

    match RedisStore::connect(url).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if environment != Environment::Production => {
            tracing::warn!("Redis connection failed: {}, using memory store only", e);
            Ok(Arc::new(MemoryStore::new()))
        }
        Err(e) => Err(anyhow::anyhow!("Redis connection failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("tx:0x01", "a").await.unwrap());
        assert!(!store.set_if_absent("tx:0x01", "b").await.unwrap());
        assert_eq!(store.get("tx:0x01").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn delete_if_equals_checks_current_value() {
        let store = MemoryStore::new();
        assert_ok!(store.set("claim", "owner-a").await);

        assert!(!store.delete_if_equals("claim", "owner-b").await.unwrap());
        assert!(store.get("claim").await.unwrap().is_some());

        assert!(store.delete_if_equals("claim", "owner-a").await.unwrap());
        assert!(store.get("claim").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_counter_resets_after_expiry() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        assert_eq!(store.increment_window("rl", window).await.unwrap(), 1);
        assert_eq!(store.increment_window("rl", window).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.increment_window("rl", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_windows_are_dropped() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(1);

        for i in 0..1000 {
            store
                .increment_window(&format!("ratelimit:verify-payment:10.0.0.1:{}", i), window)
                .await
                .unwrap();
        }
        assert_ok!(store.set("verification:1:0:0xabc", "{}").await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.increment_window("ratelimit:fresh", window).await.unwrap();

        let state = store.state.lock().await;
        assert_eq!(state.entries.len(), 2);
        assert!(state.entries.contains_key("verification:1:0:0xabc"));
        assert_eq!(state.expiries.len(), 1);
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_dyn_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        assert_ok!(store.set_json("n", &42u32).await);
        assert_eq!(store.get_json::<u32>("n").await.unwrap(), Some(42));

        assert_ok!(store.set("bad", "not json").await);
        assert_err!(store.get_json::<u32>("bad").await);
    }

    #[tokio::test]
    async fn missing_redis_url_falls_back_to_memory() {
        let store = connect(None, Environment::Development).await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await);
    }
}
