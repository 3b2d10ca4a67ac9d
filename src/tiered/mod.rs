//! Tiered Cache Module
//!
//! Tier 1 (in-process) in front of tier 2 (shared remote store) with
//! read-through promotion, write-through, and degradation to tier 1 alone
//! whenever tier 2 is unreachable.

mod stats;

pub use stats::{HitRateSummary, RemoteStats, TieredCounterSnapshot, TieredCounters, TieredStats};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cache::{current_timestamp_ms, CacheValue, LocalCache};
use crate::codec::{Codec, PayloadCodec};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::layer::{CacheLayer, HealthCheck, HealthStatus, LayerStats};
use crate::remote::RemoteTier;

// == Tiered Cache ==
/// Two-tier cache.
///
/// Tier-1 keys are stored as given; tier-2 keys carry the configured
/// namespace prefix. The tier-1 lock is released before any remote call,
/// and every remote call runs under the per-call timeout.
pub struct TieredCache {
    local: LocalCache,
    remote: Option<Arc<dyn RemoteTier>>,
    codec: PayloadCodec,
    counters: TieredCounters,
    key_prefix: String,
    remote_ttl: Duration,
    promotion_ttl: Duration,
    timeout: Duration,
    scan_batch: usize,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("key_prefix", &self.key_prefix)
            .field("codec", &self.codec)
            .finish()
    }
}

impl TieredCache {
    // == Constructor ==
    /// Creates a tiered cache.
    ///
    /// # Arguments
    /// * `local` - Tier 1
    /// * `remote` - Tier 2, or `None` to run tier 1 only
    /// * `config` - Tier-2 TTLs, prefix, compression and timeouts
    pub fn new(local: LocalCache, remote: Option<Arc<dyn RemoteTier>>, config: &RedisConfig) -> Self {
        Self {
            local,
            remote,
            codec: PayloadCodec::new(
                Arc::new(crate::codec::JsonCodec),
                config.enable_compression,
                config.compression_threshold,
            ),
            counters: TieredCounters::default(),
            key_prefix: config.key_prefix.clone(),
            remote_ttl: config.ttl,
            promotion_ttl: config.promotion_ttl,
            timeout: config.timeout(),
            scan_batch: config.scan_batch.max(1),
        }
    }

    /// Replaces the value encoding used for tier-2 payloads.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>, compression: bool, threshold: usize) -> Self {
        self.codec = PayloadCodec::new(codec, compression, threshold);
        self
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteTier>> {
        self.remote.as_ref()
    }

    /// Tier-1 TTL given to values promoted from tier 2.
    pub fn promotion_ttl(&self) -> Duration {
        self.promotion_ttl
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Tier 2, only while it is connected.
    fn connected_remote(&self) -> Option<&Arc<dyn RemoteTier>> {
        self.remote.as_ref().filter(|remote| remote.is_connected())
    }

    /// Runs a remote call under the per-call timeout.
    async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn remote_failed(&self, op: &str, key: &str, e: &CacheError) {
        self.counters.record_remote_error();
        warn!(op = %op, key = %key, error = %e, "Remote tier call failed");
    }

    // == Get ==
    /// Reads through tier 1, then tier 2.
    ///
    /// A tier-2 hit is promoted into tier 1 with the promotion TTL. Every read
    /// issued while tier 2 is configured but down counts one fallback.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        let degraded = matches!(&self.remote, Some(remote) if !remote.is_connected());
        if degraded {
            self.counters.record_fallback();
        }

        if let Some(value) = self.local.get(key) {
            self.counters.record_local_hit();
            debug!(key = %key, "cache hit (L1)");
            return Some(value);
        }

        let Some(remote) = self.connected_remote() else {
            self.counters.record_miss();
            return None;
        };

        match self.call(remote.get(&self.remote_key(key))).await {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(value) => {
                    self.counters.record_remote_hit();
                    debug!(key = %key, "cache hit (L2)");
                    let value = Arc::new(value);
                    self.local
                        .set(key, CacheValue::clone(&value), Some(self.promotion_ttl));
                    Some(value)
                }
                Err(e) => {
                    self.remote_failed("get", key, &e);
                    self.counters.record_miss();
                    None
                }
            },
            Ok(None) => {
                self.counters.record_miss();
                None
            }
            Err(e) => {
                self.remote_failed("get", key, &e);
                self.counters.record_fallback();
                self.counters.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Writes tier 1, then tier 2. Tier-2 failures never fail the write.
    pub async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        let remote_payload = match self.connected_remote() {
            Some(_) => Some(self.codec.encode(&value)),
            None => None,
        };

        let stored = self.local.set(key, value, ttl);

        if let (Some(remote), Some(payload)) = (self.connected_remote(), remote_payload) {
            let result = match payload {
                Ok(encoded) => {
                    self.counters.record_compression_savings(encoded.saved_bytes);
                    let remote_ttl = ttl.unwrap_or(self.remote_ttl);
                    self.call(remote.set_with_ttl(&self.remote_key(key), &encoded.bytes, remote_ttl))
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.remote_failed("set", key, &e);
            }
        }

        stored
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.local.delete(key);

        if let Some(remote) = self.connected_remote() {
            if let Err(e) = self.call(remote.delete(&[self.remote_key(key)])).await {
                self.remote_failed("delete", key, &e);
            }
        }

        removed
    }

    /// Deletes several keys. Returns how many were present in tier 1.
    pub async fn delete_many(&self, keys: &[String]) -> usize {
        let removed = self.local.delete_many(keys);

        if let Some(remote) = self.connected_remote() {
            let remote_keys: Vec<String> = keys.iter().map(|k| self.remote_key(k)).collect();
            if let Err(e) = self.call(remote.delete(&remote_keys)).await {
                self.remote_failed("delete_many", &format!("{} keys", keys.len()), &e);
            }
        }

        removed
    }

    /// Deletes keys from both tiers for invalidation.
    ///
    /// Same as `delete_many`, except a tier-2 failure is counted and returned
    /// so the stale remote copy is not silently left behind.
    pub async fn invalidate(&self, keys: &[String]) -> Result<usize> {
        let removed = self.local.delete_many(keys);
        if keys.is_empty() {
            return Ok(removed);
        }

        if let Some(remote) = self.connected_remote() {
            let remote_keys: Vec<String> = keys.iter().map(|k| self.remote_key(k)).collect();
            if let Err(e) = self.call(remote.delete(&remote_keys)).await {
                self.remote_failed("invalidate", &format!("{} keys", keys.len()), &e);
                return Err(e);
            }
        }

        Ok(removed)
    }

    // == Has ==
    pub async fn has(&self, key: &str) -> bool {
        if self.local.has(key) {
            return true;
        }
        let Some(remote) = self.connected_remote() else {
            return false;
        };
        match self.call(remote.exists(&self.remote_key(key))).await {
            Ok(exists) => exists,
            Err(e) => {
                self.remote_failed("exists", key, &e);
                false
            }
        }
    }

    // == Pattern Invalidation ==
    /// Deletes matching keys from both tiers.
    ///
    /// Tier 2 is walked with cursor-based SCAN in bounded batches. Returns the
    /// tier-1 count; a tier-2 failure is counted and returned as an error.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let removed = self.local.invalidate_pattern(pattern)?;

        if let Some(remote) = self.connected_remote() {
            let remote_pattern = self.remote_key(pattern);
            match self.scan_delete(remote.as_ref(), &remote_pattern).await {
                Ok(remote_removed) => {
                    debug!(pattern = %pattern, local = removed, remote = remote_removed, "Pattern invalidated");
                }
                Err(e) => {
                    self.remote_failed("invalidate_pattern", pattern, &e);
                    return Err(e);
                }
            }
        }

        Ok(removed)
    }

    /// SCAN/DEL loop over one pattern.
    async fn scan_delete(&self, remote: &dyn RemoteTier, pattern: &str) -> Result<u64> {
        let mut cursor = 0u64;
        let mut deleted = 0u64;
        loop {
            let (next, keys) = self.call(remote.scan(cursor, pattern, self.scan_batch)).await?;
            if !keys.is_empty() {
                deleted += self.call(remote.delete(&keys)).await?;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    // == Clear ==
    /// Clears tier 1 and the whole tier-2 namespace.
    pub async fn clear(&self) {
        self.local.clear();

        if let Some(remote) = self.connected_remote() {
            let namespace = format!("{}*", self.key_prefix);
            match self.scan_delete(remote.as_ref(), &namespace).await {
                Ok(deleted) => info!(deleted, "Remote namespace cleared"),
                Err(e) => self.remote_failed("clear", &namespace, &e),
            }
        }
    }

    // == Warm Up ==
    /// Writes each entry through both tiers. Returns how many tier-1 writes succeeded.
    pub async fn warm_up<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, CacheValue, Option<Duration>)>,
    {
        let mut loaded = 0;
        for (key, value, ttl) in entries {
            if self.set(&key, value, ttl).await {
                loaded += 1;
            }
        }
        info!(loaded, "Cache warmed up");
        loaded
    }

    // == Health ==
    /// Probes each tier with a short-lived key.
    pub async fn health_check(&self) -> HealthCheck {
        let mut issues = Vec::new();

        if !self.local.probe() {
            issues.push("L1 cache read/write probe failed".to_string());
            return HealthCheck::new(HealthStatus::Unhealthy, issues);
        }

        if let Some(remote) = &self.remote {
            if !remote.is_connected() {
                issues.push(format!("{} not connected", remote.name()));
            } else if let Err(e) = self.probe_remote(remote.as_ref()).await {
                issues.push(format!("{} probe failed: {}", remote.name(), e));
            }
        }

        let status = if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthCheck::new(status, issues)
    }

    async fn probe_remote(&self, remote: &dyn RemoteTier) -> Result<()> {
        let key = self.remote_key(&format!("__health_check__:{}", current_timestamp_ms()));
        let encoded = self.codec.encode(&json!({ "probe": true }))?;

        self.call(remote.set_with_ttl(&key, &encoded.bytes, Duration::from_secs(10)))
            .await?;
        let read = self.call(remote.get(&key)).await?;
        if let Err(e) = self.call(remote.delete(&[key.clone()])).await {
            warn!(key = %key, error = %e, "Health check key not cleaned up");
        }

        match read {
            Some(bytes) if bytes == encoded.bytes => Ok(()),
            _ => Err(CacheError::Remote("probe value mismatch".to_string())),
        }
    }

    // == Stats ==
    pub fn stats(&self) -> TieredStats {
        let counters = self.counters.snapshot();
        TieredStats {
            local: self.local.stats(),
            remote: RemoteStats {
                configured: self.remote.is_some(),
                state: self.remote.as_ref().map(|r| r.state()),
                counters,
            },
            summary: HitRateSummary::from_counters(&counters),
        }
    }

    /// Zeroes tiered and tier-1 counters.
    pub fn reset_stats(&self) {
        self.counters.reset();
        self.local.reset_stats();
    }
}

#[async_trait]
impl CacheLayer for TieredCache {
    async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        TieredCache::get(self, key).await
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        TieredCache::set(self, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> bool {
        TieredCache::delete(self, key).await
    }

    async fn delete_many(&self, keys: &[String]) -> usize {
        TieredCache::delete_many(self, keys).await
    }

    async fn has(&self, key: &str) -> bool {
        TieredCache::has(self, key).await
    }

    async fn invalidate(&self, keys: &[String]) -> Result<usize> {
        TieredCache::invalidate(self, keys).await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        TieredCache::invalidate_pattern(self, pattern).await
    }

    async fn clear(&self) {
        TieredCache::clear(self).await
    }

    fn stats(&self) -> LayerStats {
        LayerStats::Tiered(TieredCache::stats(self))
    }

    async fn health_check(&self) -> HealthCheck {
        TieredCache::health_check(self).await
    }
}
