mod backend;
pub mod memory;
pub mod revocation;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use dashmap::DashSet;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::CacheConfig;
use backend::{NetworkedBackend, RedisBackend};
use memory::MemoryStore;

/// Upper bound on a single connection attempt at startup
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Which backend is currently serving cache operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Redis reachable; writes carry a native expiry
    Networked,
    /// Serving entirely from process memory
    MemoryFallback,
}

/// Key-value cache over two interchangeable backends: Redis and an
/// in-process map.
///
/// Every write goes through the memory store, so flipping to fallback mode
/// loses nothing this process has written. Backend errors never reach
/// callers; an error or timeout degrades the manager to memory fallback,
/// and the maintenance task pings Redis to flip back once it recovers,
/// replaying any deletes issued while degraded before reads hit Redis
/// again. Both transitions are logged since they affect durability across
/// process restarts.
pub struct CacheManager {
    redis: Option<Arc<dyn NetworkedBackend>>,
    memory: MemoryStore,
    /// True while operating in memory-fallback mode
    degraded: AtomicBool,
    /// Keys deleted while Redis was unreachable; cleared on recovery so a
    /// remote copy cannot resurface a value the caller removed
    pending_deletes: DashSet<String>,
    op_timeout: Duration,
}

impl CacheManager {
    /// Connect to the configured Redis backend with bounded, capped
    /// backoff. No URL or exhausted retries means memory-only operation
    /// from the first call onward.
    pub async fn connect(config: &CacheConfig) -> Self {
        let op_timeout = Duration::from_millis(config.op_timeout_ms);

        let Some(url) = config.redis_url.as_deref() else {
            info!("No redis_url configured, cache running memory-only");
            return Self::memory_only(op_timeout);
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Invalid Redis URL, cache running memory-only");
                return Self::memory_only(op_timeout);
            }
        };

        let attempts = config.connect_retries.max(1);
        for attempt in 1..=attempts {
            match tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager()).await {
                Ok(Ok(conn)) => {
                    info!(attempt, "Connected to Redis cache backend");
                    return Self {
                        redis: Some(Arc::new(RedisBackend::new(conn))),
                        memory: MemoryStore::new(),
                        degraded: AtomicBool::new(false),
                        pending_deletes: DashSet::new(),
                        op_timeout,
                    };
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Redis connection attempt failed");
                }
                Err(_) => {
                    warn!(attempt, "Redis connection attempt timed out");
                }
            }

            if attempt < attempts {
                let backoff = (config.connect_backoff_ms * attempt as u64)
                    .min(config.connect_backoff_cap_ms);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        warn!(
            attempts,
            "Redis unreachable, cache running in memory fallback mode"
        );
        Self::memory_only(op_timeout)
    }

    fn memory_only(op_timeout: Duration) -> Self {
        Self {
            redis: None,
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(true),
            pending_deletes: DashSet::new(),
            op_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_backend(backend: Arc<dyn NetworkedBackend>, op_timeout: Duration) -> Self {
        Self {
            redis: Some(backend),
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            pending_deletes: DashSet::new(),
            op_timeout,
        }
    }

    pub fn mode(&self) -> CacheMode {
        if self.redis.is_some() && !self.degraded.load(Ordering::Relaxed) {
            CacheMode::Networked
        } else {
            CacheMode::MemoryFallback
        }
    }

    /// Store a value under `key` for `ttl_secs` seconds. Replaces any
    /// previous value and refreshes the expiry. A zero TTL names an entry
    /// already expired, so nothing is written. Never fails.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        // Redis rejects `EX 0`
        if ttl_secs == 0 {
            debug!(key, "Dropping cache write with zero TTL");
            return;
        }

        self.memory
            .set(key, value.to_string(), ChronoDuration::seconds(ttl_secs as i64));

        if let Some(backend) = self.networked() {
            self.run(
                "SET",
                backend.set_ex(key.to_string(), value.to_string(), ttl_secs),
            )
            .await;
        }
    }

    /// Look up a live value. Expired and missing entries are both absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }

        let backend = self.networked()?;
        self.run("GET", backend.get(key.to_string())).await.flatten()
    }

    /// Remove a key from both backends. When Redis is unreachable the
    /// remote delete is queued and replayed on recovery.
    pub async fn delete(&self, key: &str) {
        self.memory.remove(key);

        let Some(backend) = self.redis.clone() else {
            return;
        };
        if self.degraded.load(Ordering::Relaxed) {
            self.pending_deletes.insert(key.to_string());
            return;
        }
        if self.run("DEL", backend.del(key.to_string())).await.is_none() {
            self.pending_deletes.insert(key.to_string());
        }
    }

    /// All live values whose key starts with `prefix`, merged across both
    /// backends and deduplicated by key. Order is unspecified.
    pub async fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        let mut merged: std::collections::HashMap<String, String> =
            self.memory.scan_prefix(prefix).into_iter().collect();

        if let Some(backend) = self.networked() {
            let pattern = format!("{prefix}*");
            if let Some(pairs) = self.run("SCAN", backend.scan_values(pattern)).await {
                for (key, value) in pairs {
                    merged.entry(key).or_insert(value);
                }
            }
        }

        merged.into_values().collect()
    }

    /// Periodic maintenance: purge expired fallback entries to bound
    /// memory, and probe Redis for recovery while degraded. Abort the
    /// returned handle at shutdown.
    pub fn spawn_maintenance(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let dropped = cache.memory.purge_expired();
                if dropped > 0 {
                    debug!(dropped, "Purged expired in-memory cache entries");
                }

                cache.try_recover().await;
            }
        })
    }

    async fn try_recover(&self) {
        if !self.degraded.load(Ordering::Relaxed) {
            return;
        }
        let Some(backend) = self.redis.clone() else {
            return;
        };

        if !matches!(
            tokio::time::timeout(self.op_timeout, backend.ping()).await,
            Ok(Ok(()))
        ) {
            return;
        }

        // Clear queued deletes before reads reach Redis again; a leftover
        // key would resurface a value the caller already removed.
        let pending: Vec<String> = self
            .pending_deletes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in pending {
            match tokio::time::timeout(self.op_timeout, backend.del(key.clone())).await {
                Ok(Ok(())) => {
                    self.pending_deletes.remove(&key);
                }
                // Backend went away again, retry the whole pass next sweep
                _ => return,
            }
        }

        if self
            .degraded
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Redis reachable again, leaving memory fallback mode");
        }
    }

    fn networked(&self) -> Option<Arc<dyn NetworkedBackend>> {
        if self.degraded.load(Ordering::Relaxed) {
            None
        } else {
            self.redis.clone()
        }
    }

    /// Run a networked operation under the configured timeout. Any error
    /// degrades the manager instead of surfacing to the caller.
    async fn run<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.degrade(op, &e.to_string());
                None
            }
            Err(_) => {
                self.degrade(op, "operation timed out");
                None
            }
        }
    }

    fn degrade(&self, op: &'static str, reason: &str) {
        if self
            .degraded
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!(
                op,
                reason,
                "Redis backend failed, switching to memory fallback mode"
            );
        }
    }

    /// Direct access to the memory tier, for tests that need to control
    /// the clock.
    #[cfg(test)]
    pub(crate) fn memory(&self) -> &MemoryStore {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::backend::testing::FlakyBackend;
    use super::*;

    async fn make_memory_cache() -> CacheManager {
        CacheManager::connect(&CacheConfig::default()).await
    }

    fn make_flaky_cache() -> (Arc<FlakyBackend>, CacheManager) {
        let backend = Arc::new(FlakyBackend::new());
        let cache = CacheManager::with_backend(
            Arc::clone(&backend) as Arc<dyn NetworkedBackend>,
            Duration::from_millis(100),
        );
        (backend, cache)
    }

    #[tokio::test]
    async fn test_memory_only_reports_fallback_mode() {
        let cache = make_memory_cache().await;
        assert_eq!(cache.mode(), CacheMode::MemoryFallback);
    }

    #[tokio::test]
    async fn test_set_get_delete_roundtrip() {
        let cache = make_memory_cache().await;

        cache.set("k1", "v1", 300).await;
        assert_eq!(cache.get("k1").await, Some("v1".to_string()));

        cache.delete("k1").await;
        assert_eq!(cache.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_scan_prefix_returns_only_matching_values() {
        let cache = make_memory_cache().await;

        cache.set("loc:a", "1", 300).await;
        cache.set("loc:b", "2", 300).await;
        cache.set("auth:c", "3", 300).await;

        let mut values = cache.scan_prefix("loc:").await;
        values.sort();
        assert_eq!(values, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_ttl_zero_entry_is_never_visible() {
        let cache = make_memory_cache().await;

        cache.set("k1", "v1", 0).await;
        assert_eq!(cache.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_exhausted_connect_falls_back_to_memory() {
        // Nothing listens on this port; both attempts must fail and the
        // manager still has to serve reads and writes.
        let config = CacheConfig {
            redis_url: Some("redis://127.0.0.1:59999".to_string()),
            connect_retries: 2,
            connect_backoff_ms: 10,
            connect_backoff_cap_ms: 20,
            op_timeout_ms: 100,
            sweep_interval_secs: 60,
        };
        let cache = CacheManager::connect(&config).await;

        assert_eq!(cache.mode(), CacheMode::MemoryFallback);
        cache.set("k1", "v1", 300).await;
        assert_eq!(cache.get("k1").await, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_operation_degrades_and_keeps_prior_writes() {
        let (backend, cache) = make_flaky_cache();

        cache.set("k1", "v1", 300).await;
        assert_eq!(cache.mode(), CacheMode::Networked);

        backend.set_failing(true);
        cache.set("k2", "v2", 300).await;

        // One failed call flips the mode; nothing written before or
        // during the transition is lost.
        assert_eq!(cache.mode(), CacheMode::MemoryFallback);
        assert_eq!(cache.get("k1").await, Some("v1".to_string()));
        assert_eq!(cache.get("k2").await, Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_while_degraded_replays_on_recovery() {
        let (backend, cache) = make_flaky_cache();
        cache.set("k1", "v1", 300).await;

        backend.set_failing(true);
        // A memory miss reaches the backend and degrades the manager
        cache.get("missing").await;
        assert_eq!(cache.mode(), CacheMode::MemoryFallback);

        cache.delete("k1").await;
        assert_eq!(cache.get("k1").await, None);

        backend.set_failing(false);
        cache.try_recover().await;

        // The queued delete ran before leaving fallback mode, so the
        // remote copy cannot resurface.
        assert_eq!(cache.mode(), CacheMode::Networked);
        assert!(!backend.contains("k1"));
        assert_eq!(cache.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_write_never_reaches_either_backend() {
        let (backend, cache) = make_flaky_cache();

        cache.set("k1", "v1", 0).await;

        assert_eq!(cache.mode(), CacheMode::Networked);
        assert!(!backend.contains("k1"));
        assert_eq!(cache.get("k1").await, None);
    }
}
