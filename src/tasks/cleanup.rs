//! Tier-1 Maintenance Tasks
//!
//! Background tasks that sweep expired entries and shed entries under
//! process memory pressure.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::monitor::MemoryProbe;

/// Spawns a background task that periodically removes expired entries.
///
/// Each sweep takes the same lock as foreground operations, so a sweep
/// racing a `set` on the same key keeps memory accounting exact.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = LocalCache::new(&LocalCacheConfig::default());
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: LocalCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting TTL cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired();
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

/// Spawns a background task that sheds least-recently-used entries while
/// process memory pressure is above `high_water`.
///
/// # Arguments
/// * `high_water` - Pressure ratio (0..1) that triggers shedding
/// * `fraction` - Share of tier-1 bytes released per triggered check
pub fn spawn_memory_pressure_task(
    cache: LocalCache,
    probe: Arc<dyn MemoryProbe>,
    interval: Duration,
    high_water: f64,
    fraction: f64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            high_water, "Starting memory pressure task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let snapshot = probe.snapshot();
            if snapshot.pressure <= high_water {
                continue;
            }

            let evicted = cache.relieve_pressure(fraction);
            warn!(
                pressure = snapshot.pressure,
                evicted, "Memory pressure high, shed tier-1 entries"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::FixedProbe;
    use serde_json::json;

    fn cache() -> LocalCache {
        LocalCache::with_limits(100, 1024 * 1024, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = cache();
        cache.set("expire_soon", json!("value"), Some(Duration::from_millis(50)));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;

        // Swept, not merely hidden on read
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().counters.expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = cache();
        cache.set("long_lived", json!("value"), Some(Duration::from_secs(3600)));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get("long_lived").as_deref(), Some(&json!("value")));

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(cache(), Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }

    #[tokio::test]
    async fn test_memory_pressure_task_sheds_under_pressure() {
        let cache = cache();
        for i in 0..10 {
            cache.set(&format!("k:{}", i), json!("x".repeat(100)), None);
        }

        let handle = spawn_memory_pressure_task(
            cache.clone(),
            Arc::new(FixedProbe(0.99)),
            Duration::from_millis(50),
            0.85,
            0.5,
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert!(cache.len() < 10);
        assert!(cache.stats().counters.memory_pressure_evictions > 0);
    }

    #[tokio::test]
    async fn test_memory_pressure_task_idle_when_relaxed() {
        let cache = cache();
        cache.set("k", json!(1), None);

        let handle = spawn_memory_pressure_task(
            cache.clone(),
            Arc::new(FixedProbe(0.10)),
            Duration::from_millis(20),
            0.85,
            0.5,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(cache.len(), 1);
    }
}
