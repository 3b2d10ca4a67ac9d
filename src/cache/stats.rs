//! Cache Statistics Module
//!
//! Tracks tier-1 performance counters: hits, misses, evictions, expirations and faults.

use serde::Serialize;

// == Cache Stats ==
/// Cumulative tier-1 counters. Reset only by an explicit `reset`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful retrievals
    pub hits: u64,
    /// Number of failed retrievals (absent or expired)
    pub misses: u64,
    /// Entries evicted by the count limit or byte ceiling
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries shed by the process memory-pressure sweep
    pub memory_pressure_evictions: u64,
    /// Local faults (serialization, rejected writes)
    pub errors: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Hit rate as a percentage, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_pressure_eviction(&mut self) {
        self.memory_pressure_evictions += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// == Snapshot ==
/// Point-in-time view of tier 1: counters plus occupancy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalCacheStats {
    #[serde(flatten)]
    pub counters: CacheStats,
    /// Hit rate percentage
    pub hit_rate: f64,
    /// Current number of entries
    pub size: usize,
    /// Entry limit
    pub max_size: usize,
    /// Approximate bytes held
    pub memory_usage_bytes: usize,
    /// Byte ceiling
    pub max_memory_bytes: usize,
    /// memory_usage_bytes / max_memory_bytes as a percentage
    pub memory_utilization: f64,
}

impl LocalCacheStats {
    pub fn new(
        counters: CacheStats,
        size: usize,
        max_size: usize,
        memory_usage_bytes: usize,
        max_memory_bytes: usize,
    ) -> Self {
        let memory_utilization = if max_memory_bytes == 0 {
            0.0
        } else {
            memory_usage_bytes as f64 / max_memory_bytes as f64 * 100.0
        };
        Self {
            hit_rate: counters.hit_rate(),
            counters,
            size,
            max_size,
            memory_usage_bytes,
            max_memory_bytes,
            memory_utilization,
        }
    }
}
