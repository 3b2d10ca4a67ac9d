//! Cache Store Module
//!
//! Tier-1 engine combining HashMap storage with LRU tracking, TTL expiration
//! and an approximate byte ceiling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::entry::{current_timestamp_ms, estimate_size};
use crate::cache::{
    CacheEntry, CacheStats, CacheValue, ExpiryQueue, GlobPattern, LocalCacheStats, LruTracker,
    MAX_KEY_LENGTH,
};
use crate::error::{CacheError, Result};

/// Stale expiry records tolerated beyond twice the live entry count.
const EXPIRY_SLACK: usize = 16;

// == Entry Info ==
/// Debug view of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub size_bytes: usize,
    pub created_at: u64,
    pub last_accessed_at: u64,
    pub age_ms: u64,
    pub has_expiry: bool,
}

// == Cache Store ==
/// Tier-1 storage with LRU eviction, TTL support and memory accounting.
///
/// Not synchronized; `LocalCache` owns it behind a mutex.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Pending expirations
    expiry: ExpiryQueue,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Approximate byte ceiling
    max_memory_bytes: usize,
    /// Sum of entry sizes
    memory_usage: usize,
    /// TTL for entries written without one
    default_ttl: Duration,
    /// Write generation counter
    generation: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    /// * `max_memory_bytes` - Approximate ceiling for the sum of entry sizes
    /// * `default_ttl` - TTL used when `set` receives `None`
    pub fn new(max_entries: usize, max_memory_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            expiry: ExpiryQueue::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            max_memory_bytes,
            memory_usage: 0,
            default_ttl,
            generation: 0,
        }
    }

    // == Set ==
    /// Stores a key-value pair.
    ///
    /// A replaced entry's size is released before the new size is charged.
    /// LRU entries are evicted until the byte ceiling and the entry limit
    /// both have room. Failures are counted as errors.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - `None` uses the default TTL, `Some(Duration::ZERO)` never expires
    pub fn set(&mut self, key: String, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let result = self.try_set(key, value, ttl);
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    fn try_set(&mut self, key: String, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key must be 1..={} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let size = estimate_size(&value)?;
        if size > self.max_memory_bytes {
            return Err(CacheError::InvalidRequest(format!(
                "Value of {} bytes exceeds the {} byte ceiling",
                size, self.max_memory_bytes
            )));
        }

        // Release the old entry first so its bytes are never counted twice
        self.remove_entry(&key);

        while self.memory_usage + size > self.max_memory_bytes {
            if !self.evict_lru() {
                break;
            }
        }
        while self.entries.len() >= self.max_entries {
            if !self.evict_lru() {
                break;
            }
        }

        self.generation += 1;
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(value, size, ttl, self.generation);
        if let Some(deadline) = entry.expires_at {
            self.expiry.schedule(&key, entry.generation, deadline);
        }

        self.memory_usage += size;
        self.lru.touch(&key);
        self.entries.insert(key, entry);
        self.compact_expiry();

        Ok(())
    }

    /// Drops heap records left behind by overwrites and deletes once they
    /// outnumber live entries two to one.
    fn compact_expiry(&mut self) {
        if self.expiry.len() <= 2 * self.entries.len() + EXPIRY_SLACK {
            return;
        }
        let entries = &self.entries;
        self.expiry.retain(|key, generation| {
            entries
                .get(key)
                .map(|entry| entry.generation == generation)
                .unwrap_or(false)
        });
    }

    // == Get ==
    /// Retrieves a value by key, refreshing its LRU position.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<Arc<CacheValue>> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = current_timestamp_ms();
        Some(Arc::clone(&entry.value))
    }

    // == Has ==
    /// Existence check; does not touch LRU order or statistics.
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Delete ==
    /// Removes an entry by key. Returns false if it was absent.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Removes every key matching the glob. Returns how many were removed.
    pub fn delete_matching(&mut self, pattern: &GlobPattern) -> usize {
        let matched: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();

        for key in &matched {
            self.remove_entry(key);
        }
        matched.len()
    }

    // == Clear ==
    /// Empties all structures. Statistics are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.expiry.clear();
        self.memory_usage = 0;
    }

    // == Stats ==
    /// Returns current statistics.
    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats::new(
            self.stats.clone(),
            self.entries.len(),
            self.max_entries,
            self.memory_usage,
            self.max_memory_bytes,
        )
    }

    /// Zeroes cumulative counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    // == Cleanup Expired ==
    /// Removes entries whose TTL has elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        for (key, generation) in self.expiry.pop_due(now) {
            let current = self
                .entries
                .get(&key)
                .map(|entry| entry.generation == generation)
                .unwrap_or(false);
            // Overwritten or deleted since this expiry was scheduled
            if !current {
                continue;
            }
            self.remove_entry(&key);
            self.stats.record_expiration();
            removed += 1;
        }

        removed
    }

    // == Memory Pressure ==
    /// Sheds `fraction` of current usage in LRU order.
    ///
    /// Returns the number of entries evicted.
    pub fn relieve_pressure(&mut self, fraction: f64) -> usize {
        let fraction = fraction.clamp(0.0, 1.0);
        let target = self.memory_usage.saturating_sub((self.memory_usage as f64 * fraction) as usize);
        let mut evicted = 0;

        while self.memory_usage > target {
            let Some(key) = self.lru.evict_oldest() else {
                break;
            };
            self.remove_entry(&key);
            self.stats.record_pressure_eviction();
            evicted += 1;
        }

        evicted
    }

    // == Introspection ==
    /// Lists entries from most to least recently used.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = current_timestamp_ms();
        let mut infos: Vec<EntryInfo> = self
            .lru
            .iter_oldest_first()
            .filter_map(|key| self.entries.get(key).map(|entry| (key, entry)))
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                size_bytes: entry.size_bytes,
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
                age_ms: now.saturating_sub(entry.created_at),
                has_expiry: entry.expires_at.is_some(),
            })
            .collect();
        infos.reverse();
        infos
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Approximate bytes currently held.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Internals ==
    /// Evicts the least recently used entry. Returns false when empty.
    fn evict_lru(&mut self) -> bool {
        match self.lru.evict_oldest() {
            Some(key) => {
                self.remove_entry(&key);
                self.stats.record_eviction();
                true
            }
            None => false,
        }
    }

    /// Removes an entry and its access record, releasing its bytes.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.memory_usage = self.memory_usage.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    const MB: usize = 1024 * 1024;
    const TTL: Duration = Duration::from_secs(300);

    fn store(max_entries: usize) -> CacheStore {
        CacheStore::new(max_entries, MB, TTL)
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.memory_usage(), 0);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100);

        store.set("key1".to_string(), json!("value1"), None).unwrap();
        let value = store.get("key1").unwrap();

        assert_eq!(*value, json!("value1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.memory_usage(), 8);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);
        assert!(store.get("nonexistent").is_none());
        assert_eq!(store.stats().counters.misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = store(100);

        store.set("key1".to_string(), json!("value1"), None).unwrap();
        assert!(store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.memory_usage(), 0);
        assert!(store.get("key1").is_none());
    }

    #[test]
    fn test_store_delete_nonexistent() {
        let mut store = store(100);
        assert!(!store.delete("nonexistent"));
    }

    #[test]
    fn test_store_overwrite_does_not_double_count() {
        let mut store = store(100);

        store.set("key1".to_string(), json!("aaaa"), None).unwrap();
        store.set("key1".to_string(), json!("bb"), None).unwrap();

        assert_eq!(*store.get("key1").unwrap(), json!("bb"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.memory_usage(), 4);
    }

    #[test]
    fn test_store_has_does_not_touch_stats_or_lru() {
        let mut store = store(2);
        store.set("a".to_string(), json!(1), None).unwrap();
        store.set("b".to_string(), json!(2), None).unwrap();

        assert!(store.has("a"));
        assert!(!store.has("zzz"));
        let stats = store.stats();
        assert_eq!(stats.counters.hits, 0);
        assert_eq!(stats.counters.misses, 0);

        // "a" is still the LRU victim
        store.set("c".to_string(), json!(3), None).unwrap();
        assert!(!store.has("a"));
        assert!(store.has("b"));
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = store(100);

        store
            .set("key1".to_string(), json!("value1"), Some(Duration::from_millis(50)))
            .unwrap();
        assert!(store.get("key1").is_some());

        sleep(Duration::from_millis(80));

        assert!(store.get("key1").is_none());
        assert_eq!(store.stats().counters.expirations, 1);
        assert_eq!(store.memory_usage(), 0);
    }

    #[test]
    fn test_store_zero_ttl_never_expires() {
        let mut store = CacheStore::new(10, MB, Duration::from_millis(10));
        store
            .set("forever".to_string(), json!(1), Some(Duration::ZERO))
            .unwrap();
        sleep(Duration::from_millis(30));
        assert_eq!(store.cleanup_expired(), 0);
        assert!(store.get("forever").is_some());
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3);

        store.set("key1".to_string(), json!(1), None).unwrap();
        store.set("key2".to_string(), json!(2), None).unwrap();
        store.set("key3".to_string(), json!(3), None).unwrap();
        store.set("key4".to_string(), json!(4), None).unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.get("key1").is_none());
        assert!(store.get("key2").is_some());
        assert!(store.get("key3").is_some());
        assert!(store.get("key4").is_some());
        assert_eq!(store.stats().counters.evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = store(3);

        store.set("key1".to_string(), json!(1), None).unwrap();
        store.set("key2".to_string(), json!(2), None).unwrap();
        store.set("key3".to_string(), json!(3), None).unwrap();

        store.get("key1").unwrap();
        store.set("key4".to_string(), json!(4), None).unwrap();

        assert!(store.get("key1").is_some());
        assert!(store.get("key2").is_none());
    }

    #[test]
    fn test_store_overwrite_at_capacity_does_not_evict() {
        let mut store = store(2);
        store.set("a".to_string(), json!(1), None).unwrap();
        store.set("b".to_string(), json!(2), None).unwrap();
        store.set("a".to_string(), json!(10), None).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().counters.evictions, 0);
    }

    #[test]
    fn test_store_byte_ceiling_evicts_lru_first() {
        // Each "xxxxxxxx" string serializes to 10 bytes
        let mut store = CacheStore::new(100, 25, TTL);

        store.set("a".to_string(), json!("xxxxxxxx"), None).unwrap();
        store.set("b".to_string(), json!("xxxxxxxx"), None).unwrap();
        store.set("c".to_string(), json!("xxxxxxxx"), None).unwrap();

        assert!(store.memory_usage() <= 25);
        assert!(!store.has("a"));
        assert!(store.has("b"));
        assert!(store.has("c"));
    }

    #[test]
    fn test_store_rejects_value_larger_than_ceiling() {
        let mut store = CacheStore::new(100, 4, TTL);
        let result = store.set("k".to_string(), json!("too large"), None);

        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert_eq!(store.stats().counters.errors, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_key_validation() {
        let mut store = store(100);
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        assert!(matches!(
            store.set(long_key, json!(1), None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(matches!(
            store.set(String::new(), json!(1), None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert_eq!(store.stats().counters.errors, 2);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = store(100);

        store
            .set("key1".to_string(), json!(1), Some(Duration::from_millis(30)))
            .unwrap();
        store
            .set("key2".to_string(), json!(2), Some(Duration::from_secs(10)))
            .unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_store_stale_expiry_does_not_remove_newer_value() {
        let mut store = store(100);

        store
            .set("k".to_string(), json!("old"), Some(Duration::from_millis(30)))
            .unwrap();
        store
            .set("k".to_string(), json!("new"), Some(Duration::from_secs(10)))
            .unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(store.cleanup_expired(), 0);
        assert_eq!(*store.get("k").unwrap(), json!("new"));
    }

    #[test]
    fn test_store_overwrites_keep_expiry_heap_bounded() {
        let mut store = store(100);

        for i in 0..1000 {
            store
                .set("hot".to_string(), json!(i), Some(Duration::from_secs(3600)))
                .unwrap();
        }

        assert_eq!(store.len(), 1);
        assert!(store.expiry.len() <= 2 + EXPIRY_SLACK + 1);
        assert_eq!(*store.get("hot").unwrap(), json!(999));
    }

    #[test]
    fn test_store_delete_matching() {
        let mut store = store(100);
        store.set("user:1".to_string(), json!(1), None).unwrap();
        store.set("user:2".to_string(), json!(2), None).unwrap();
        store.set("order:1".to_string(), json!(3), None).unwrap();

        let glob = GlobPattern::new("user:*").unwrap();
        assert_eq!(store.delete_matching(&glob), 2);
        assert!(store.has("order:1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_clear_keeps_stats() {
        let mut store = store(100);
        store.set("a".to_string(), json!(1), None).unwrap();
        store.get("a");
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.memory_usage(), 0);
        assert_eq!(store.stats().counters.hits, 1);
    }

    #[test]
    fn test_store_relieve_pressure() {
        let mut store = store(100);
        for i in 0..10 {
            // 10 bytes each
            store.set(format!("k{}", i), json!("xxxxxxxx"), None).unwrap();
        }
        assert_eq!(store.memory_usage(), 100);

        let evicted = store.relieve_pressure(0.2);

        assert_eq!(evicted, 2);
        assert_eq!(store.memory_usage(), 80);
        assert!(!store.has("k0"));
        assert!(!store.has("k1"));
        assert!(store.has("k2"));
        assert_eq!(store.stats().counters.memory_pressure_evictions, 2);
    }

    #[test]
    fn test_store_entries_most_recent_first() {
        let mut store = store(100);
        store.set("a".to_string(), json!(1), None).unwrap();
        store.set("b".to_string(), json!(2), None).unwrap();
        store.get("a");

        let keys: Vec<String> = store.entries().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
