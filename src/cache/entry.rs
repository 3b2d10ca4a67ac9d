//! Cache Entry Module
//!
//! Defines the structure for individual tier-1 entries with TTL and size accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::CacheValue;
use crate::error::Result;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Arc<CacheValue>,
    /// Approximate size in bytes (serialized length)
    pub size_bytes: usize,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read or write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
    /// Write generation; expiry records for older generations are ignored
    pub generation: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `size_bytes` - Precomputed approximate size
    /// * `ttl` - Time to live, `Duration::ZERO` = no expiry
    /// * `generation` - Write generation assigned by the store
    pub fn new(value: CacheValue, size_bytes: usize, ttl: Duration, generation: u64) -> Self {
        let now = current_timestamp_ms();
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);

        Self {
            value: Arc::new(value),
            size_bytes,
            created_at: now,
            last_accessed_at: now,
            expires_at,
            generation,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current instant reaches its expiration.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks expiry against a caller-supplied instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}

// == Size Estimation ==
/// Approximates the memory footprint of a value by its serialized JSON length.
///
/// This is a heuristic for eviction decisions, not exact heap accounting.
pub fn estimate_size(value: &CacheValue) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
