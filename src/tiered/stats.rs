//! Tiered cache counters and snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::LocalCacheStats;
use crate::remote::ConnectionState;

/// Lock-free counters updated on every tiered operation.
#[derive(Debug, Default)]
pub struct TieredCounters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
    fallbacks_to_local: AtomicU64,
    compression_savings: AtomicU64,
}

impl TieredCounters {
    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_to_local.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compression_savings(&self, bytes: usize) {
        self.compression_savings
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TieredCounterSnapshot {
        TieredCounterSnapshot {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            fallbacks_to_local: self.fallbacks_to_local.load(Ordering::Relaxed),
            compression_savings_bytes: self.compression_savings.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.local_hits,
            &self.remote_hits,
            &self.misses,
            &self.remote_errors,
            &self.fallbacks_to_local,
            &self.compression_savings,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TieredCounterSnapshot {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub remote_errors: u64,
    pub fallbacks_to_local: u64,
    pub compression_savings_bytes: u64,
}

/// Hit rates as percentages of all tiered reads.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HitRateSummary {
    pub total_requests: u64,
    pub overall_hit_rate: f64,
    pub l1_hit_rate: f64,
    pub l2_hit_rate: f64,
}

impl HitRateSummary {
    pub fn from_counters(counters: &TieredCounterSnapshot) -> Self {
        let total = counters.local_hits + counters.remote_hits + counters.misses;
        let pct = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        Self {
            total_requests: total,
            overall_hit_rate: pct(counters.local_hits + counters.remote_hits),
            l1_hit_rate: pct(counters.local_hits),
            l2_hit_rate: pct(counters.remote_hits),
        }
    }
}

/// Tier-2 view inside the tiered snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStats {
    /// Whether a remote tier is configured at all
    pub configured: bool,
    pub state: Option<ConnectionState>,
    #[serde(flatten)]
    pub counters: TieredCounterSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TieredStats {
    pub local: LocalCacheStats,
    pub remote: RemoteStats,
    pub summary: HitRateSummary,
}
