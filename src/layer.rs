//! Cache Layer Module
//!
//! The interface shared by every cache surface: tier 1 on its own, the
//! tiered cache, and the monitored decorator. Invalidation and monitoring
//! depend only on this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::cache::{CacheValue, LocalCacheStats};
use crate::error::Result;
use crate::tiered::TieredStats;

// == Health ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a probe write/read against each tier.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub timestamp: String,
}

impl HealthCheck {
    pub fn new(status: HealthStatus, issues: Vec<String>) -> Self {
        Self {
            status,
            issues,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// == Stats ==
/// Statistics snapshot of whichever layer is behind the trait object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LayerStats {
    Local(LocalCacheStats),
    Tiered(TieredStats),
}

impl LayerStats {
    /// Tier-1 portion of the snapshot.
    pub fn local(&self) -> &LocalCacheStats {
        match self {
            LayerStats::Local(stats) => stats,
            LayerStats::Tiered(stats) => &stats.local,
        }
    }

    /// Overall hit rate percentage across all tiers.
    pub fn hit_rate(&self) -> f64 {
        match self {
            LayerStats::Local(stats) => stats.hit_rate,
            LayerStats::Tiered(stats) => stats.summary.overall_hit_rate,
        }
    }

    /// Reads served so far (hits plus misses).
    pub fn total_reads(&self) -> u64 {
        match self {
            LayerStats::Local(stats) => stats.counters.hits + stats.counters.misses,
            LayerStats::Tiered(stats) => stats.summary.total_requests,
        }
    }

    pub fn size(&self) -> usize {
        self.local().size
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.local().memory_usage_bytes
    }

    pub fn memory_utilization(&self) -> f64 {
        self.local().memory_utilization
    }
}

// == Cache Layer Trait ==
/// Common async cache interface.
///
/// Read, write and delete paths never fail: faults are counted in the
/// layer's statistics and surface as `None` / `false`. `invalidate` and
/// `invalidate_pattern` return errors so invalidation callers can react.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get(&self, key: &str) -> Option<Arc<CacheValue>>;

    /// `ttl` of `None` uses the layer's default; `Duration::ZERO` never expires.
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool;

    async fn delete(&self, key: &str) -> bool;

    async fn delete_many(&self, keys: &[String]) -> usize;

    async fn has(&self, key: &str) -> bool;

    /// Deletes concrete keys from every tier. Unlike `delete_many`, a tier
    /// that fails to delete is reported. Returns the tier-1 count.
    async fn invalidate(&self, keys: &[String]) -> Result<usize>;

    /// Deletes keys matching a glob (`*`, `?`). Returns the tier-1 count.
    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize>;

    async fn clear(&self);

    /// Synchronous snapshot; never touches the network.
    fn stats(&self) -> LayerStats;

    async fn health_check(&self) -> HealthCheck;
}
