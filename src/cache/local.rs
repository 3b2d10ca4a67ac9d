//! Local Cache Module
//!
//! Shareable, synchronized handle over a `CacheStore`. This is the tier-1
//! surface used by the tiered cache, the background sweeps and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, CacheStore, CacheValue, EntryInfo, GlobPattern, LocalCacheStats};
use crate::config::LocalCacheConfig;
use crate::error::Result;
use crate::layer::{CacheLayer, HealthCheck, HealthStatus, LayerStats};

/// Utilization (percent) above which the local health check reports degraded.
const HEALTH_MEMORY_LIMIT: f64 = 90.0;

// == Local Cache ==
/// Bounded in-process cache.
///
/// Cloning is cheap and every clone shares the same store. All mutations,
/// foreground and background, go through one mutex, so accounting updates
/// are never interleaved.
#[derive(Debug, Clone)]
pub struct LocalCache {
    store: Arc<Mutex<CacheStore>>,
}

impl LocalCache {
    /// Creates a cache sized by the tier-1 configuration.
    pub fn new(config: &LocalCacheConfig) -> Self {
        Self::with_limits(config.max_entries, config.max_memory_bytes, config.default_ttl)
    }

    /// Creates a cache with explicit limits.
    ///
    /// # Arguments
    /// * `max_entries` - Entry count limit
    /// * `max_memory_bytes` - Approximate byte ceiling
    /// * `default_ttl` - TTL for writes that do not carry one
    pub fn with_limits(max_entries: usize, max_memory_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            store: Arc::new(Mutex::new(CacheStore::new(
                max_entries,
                max_memory_bytes,
                default_ttl,
            ))),
        }
    }

    // == Core Operations ==
    /// Stores a value. Returns false if the write was rejected.
    pub fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        match self.store.lock().set(key.to_string(), value, ttl) {
            Ok(()) => {
                debug!(key = %key, "L1 set");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "L1 set rejected");
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        self.store.lock().get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.store.lock().has(key)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.lock().delete(key)
    }

    /// Deletes each key, returning how many existed.
    pub fn delete_many(&self, keys: &[String]) -> usize {
        let mut store = self.store.lock();
        keys.iter().filter(|key| store.delete(key)).count()
    }

    /// Deletes every key matching a glob.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let glob = GlobPattern::new(pattern)?;
        let removed = self.store.lock().delete_matching(&glob);
        debug!(pattern = %pattern, removed, "L1 pattern invalidated");
        Ok(removed)
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    // == Statistics ==
    pub fn stats(&self) -> LocalCacheStats {
        self.store.lock().stats()
    }

    pub fn reset_stats(&self) {
        self.store.lock().reset_stats();
    }

    // == Maintenance ==
    /// Runs the expiry sweep once.
    pub fn cleanup_expired(&self) -> usize {
        self.store.lock().cleanup_expired()
    }

    /// Sheds a fraction of current usage in LRU order.
    pub fn relieve_pressure(&self, fraction: f64) -> usize {
        self.store.lock().relieve_pressure(fraction)
    }

    /// Bulk-loads entries. Returns how many were stored.
    pub fn warm_up<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, CacheValue, Option<Duration>)>,
    {
        let mut store = self.store.lock();
        entries
            .into_iter()
            .filter(|(key, value, ttl)| store.set(key.clone(), value.clone(), *ttl).is_ok())
            .count()
    }

    // == Introspection ==
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.store.lock().entries()
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.lock().keys()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Writes and reads back a short-lived probe key.
    pub fn probe(&self) -> bool {
        let key = format!("__health_check__:{}", current_timestamp_ms());
        let value = json!({ "probe": true });
        let ok = self.set(&key, value.clone(), Some(Duration::from_secs(10)))
            && self.get(&key).map(|v| *v == value).unwrap_or(false);
        self.delete(&key);
        ok
    }
}

#[async_trait]
impl CacheLayer for LocalCache {
    async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        LocalCache::get(self, key)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        LocalCache::set(self, key, value, ttl)
    }

    async fn delete(&self, key: &str) -> bool {
        LocalCache::delete(self, key)
    }

    async fn delete_many(&self, keys: &[String]) -> usize {
        LocalCache::delete_many(self, keys)
    }

    async fn has(&self, key: &str) -> bool {
        LocalCache::has(self, key)
    }

    async fn invalidate(&self, keys: &[String]) -> Result<usize> {
        Ok(LocalCache::delete_many(self, keys))
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        LocalCache::invalidate_pattern(self, pattern)
    }

    async fn clear(&self) {
        LocalCache::clear(self)
    }

    fn stats(&self) -> LayerStats {
        LayerStats::Local(LocalCache::stats(self))
    }

    async fn health_check(&self) -> HealthCheck {
        let mut issues = Vec::new();
        if !self.probe() {
            issues.push("L1 cache read/write probe failed".to_string());
            return HealthCheck::new(HealthStatus::Unhealthy, issues);
        }

        let stats = LocalCache::stats(self);
        if stats.memory_utilization > HEALTH_MEMORY_LIMIT {
            issues.push(format!(
                "L1 memory utilization high: {:.1}%",
                stats.memory_utilization
            ));
        }

        let status = if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthCheck::new(status, issues)
    }
}
