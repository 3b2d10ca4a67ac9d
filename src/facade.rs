//! Cache Facade Module
//!
//! Assembles tiers, invalidation and monitoring from `Config`, and owns the
//! background task lifecycle. `Monitored` is the decorator that reports
//! every cache call to the monitor.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheValue, LocalCache};
use crate::config::{CacheStrategy, Config, LocalCacheConfig, RedisConfig};
use crate::error::Result;
use crate::invalidation::{DomainEvent, InvalidationManager, InvalidationResult, InvalidationStats};
use crate::layer::{CacheLayer, HealthCheck, LayerStats};
use crate::monitor::{CacheMonitor, HealthReport, MemoryProbe, MetricsReport, OperationKind, SysinfoProbe};
use crate::remote::{RedisTier, RemoteTier};
use crate::tasks::{
    connect_remote, spawn_cleanup_task, spawn_event_listener, spawn_memory_pressure_task,
    spawn_monitor_report_task, spawn_reconnect_task,
};
use crate::tiered::TieredCache;

/// Capacity of the domain event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// == Monitored Decorator ==
/// Forwards every call to the wrapped layer and records its outcome and
/// duration with the monitor.
pub struct Monitored<C> {
    inner: Arc<C>,
    monitor: Arc<CacheMonitor>,
}

impl<C: CacheLayer> Monitored<C> {
    pub fn new(inner: Arc<C>, monitor: Arc<CacheMonitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    fn record(&self, kind: OperationKind, key: &str, hit: bool, started: Instant, error: Option<String>) {
        if self.monitor.is_enabled() {
            let duration_us = started.elapsed().as_micros() as u64;
            self.monitor.record_operation(kind, key, hit, duration_us, error);
        }
    }
}

#[async_trait]
impl<C: CacheLayer + 'static> CacheLayer for Monitored<C> {
    async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        let started = Instant::now();
        let value = self.inner.get(key).await;
        self.record(OperationKind::Get, key, value.is_some(), started, None);
        value
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        let started = Instant::now();
        let stored = self.inner.set(key, value, ttl).await;
        let error = (!stored).then(|| "write rejected".to_string());
        self.record(OperationKind::Set, key, false, started, error);
        stored
    }

    async fn delete(&self, key: &str) -> bool {
        let started = Instant::now();
        let deleted = self.inner.delete(key).await;
        self.record(OperationKind::Delete, key, deleted, started, None);
        deleted
    }

    async fn delete_many(&self, keys: &[String]) -> usize {
        let started = Instant::now();
        let deleted = self.inner.delete_many(keys).await;
        let label = keys.first().map(String::as_str).unwrap_or_default();
        self.record(OperationKind::DeleteMany, label, deleted > 0, started, None);
        deleted
    }

    async fn has(&self, key: &str) -> bool {
        let started = Instant::now();
        let present = self.inner.has(key).await;
        self.record(OperationKind::Has, key, present, started, None);
        present
    }

    async fn invalidate(&self, keys: &[String]) -> Result<usize> {
        let started = Instant::now();
        let result = self.inner.invalidate(keys).await;
        let error = result.as_ref().err().map(ToString::to_string);
        let label = keys.first().map(String::as_str).unwrap_or_default();
        let hit = matches!(result, Ok(n) if n > 0);
        self.record(OperationKind::DeleteMany, label, hit, started, error);
        result
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let started = Instant::now();
        let result = self.inner.invalidate_pattern(pattern).await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.record(OperationKind::InvalidatePattern, pattern, false, started, error);
        result
    }

    async fn clear(&self) {
        let started = Instant::now();
        self.inner.clear().await;
        self.record(OperationKind::Clear, "*", false, started, None);
    }

    fn stats(&self) -> LayerStats {
        self.inner.stats()
    }

    async fn health_check(&self) -> HealthCheck {
        self.inner.health_check().await
    }
}

// == Facade ==
#[derive(Debug, Clone, Serialize)]
pub struct FacadeStats {
    /// Strategy in effect after startup degradation
    pub strategy: CacheStrategy,
    pub cache: LayerStats,
    pub invalidation: InvalidationStats,
    pub monitoring: bool,
}

/// Single entry point to the caching engine.
pub struct CacheFacade {
    config: Config,
    strategy: CacheStrategy,
    tiered: Arc<TieredCache>,
    cache: Arc<Monitored<TieredCache>>,
    invalidation: Arc<InvalidationManager>,
    monitor: Arc<CacheMonitor>,
    memory: Arc<dyn MemoryProbe>,
    events: broadcast::Sender<DomainEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheFacade {
    /// Builds the engine for the configured strategy and connects tier 2.
    ///
    /// A missing URL, a pool that cannot be built or an unreachable server
    /// never fails startup: the first two run tier 1 only, the last keeps
    /// tier 2 configured for the reconnect task.
    pub async fn from_config(config: Config) -> Self {
        let remote: Option<Arc<dyn RemoteTier>> = match config.strategy {
            CacheStrategy::Local => None,
            CacheStrategy::Redis | CacheStrategy::Hybrid => match RedisTier::from_config(&config.redis) {
                Ok(tier) => {
                    let tier: Arc<dyn RemoteTier> = Arc::new(tier);
                    connect_remote(tier.as_ref()).await;
                    Some(tier)
                }
                Err(e) => {
                    warn!(error = %e, "Redis not configured, running local tier only");
                    None
                }
            },
        };

        let probe = Arc::new(SysinfoProbe::new(config.local.memory_budget_bytes));
        Self::with_remote(config, remote, probe)
    }

    /// Assembles the engine around an already built tier 2.
    pub fn with_remote(
        config: Config,
        remote: Option<Arc<dyn RemoteTier>>,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        let strategy = match (&remote, config.strategy) {
            (None, _) => CacheStrategy::Local,
            (Some(_), CacheStrategy::Local) => CacheStrategy::Hybrid,
            (Some(_), strategy) => strategy,
        };

        let local = LocalCache::new(&local_config(&config, strategy));
        let tiered = Arc::new(TieredCache::new(local, remote, &remote_config(&config, strategy)));
        let monitor = Arc::new(CacheMonitor::new(
            tiered.clone(),
            config.monitor.clone(),
            memory.clone(),
        ));
        let cache = Arc::new(Monitored::new(tiered.clone(), monitor.clone()));
        let invalidation = Arc::new(InvalidationManager::new(cache.clone()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(strategy = ?strategy, monitoring = config.monitor.enabled, "Cache engine assembled");

        Self {
            config,
            strategy,
            tiered,
            cache,
            invalidation,
            monitor,
            memory,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Accessors ==
    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The monitored cache as a trait object.
    pub fn cache(&self) -> Arc<dyn CacheLayer> {
        self.cache.clone()
    }

    pub fn tiered(&self) -> &Arc<TieredCache> {
        &self.tiered
    }

    pub fn invalidation(&self) -> &Arc<InvalidationManager> {
        &self.invalidation
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        &self.monitor
    }

    // == Cache Operations ==
    pub async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        self.cache.get(key).await
    }

    /// Stores a value. Without a TTL the key's category TTL applies.
    pub async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.ttl.ttl_for_key(key));
        self.cache.set(key, value, Some(ttl)).await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.cache.delete(key).await
    }

    pub async fn has(&self, key: &str) -> bool {
        self.cache.has(key).await
    }

    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        self.cache.invalidate_pattern(pattern).await
    }

    pub async fn clear(&self) {
        self.cache.clear().await;
    }

    /// Cache-aside read: on a miss, runs `fetcher`, stores its value and
    /// returns it. Fetcher errors propagate and nothing is stored.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<Arc<CacheValue>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<CacheValue, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        debug!(key = %key, "Cache miss, fetching");
        let value = fetcher().await?;
        let shared = Arc::new(value.clone());
        self.set(key, value, ttl).await;
        Ok(shared)
    }

    /// Preloads entries through both tiers.
    pub async fn warm_up<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, CacheValue, Option<Duration>)>,
    {
        let policy = &self.config.ttl;
        let entries: Vec<_> = entries
            .into_iter()
            .map(|(key, value, ttl)| {
                let ttl = ttl.unwrap_or_else(|| policy.ttl_for_key(&key));
                (key, value, Some(ttl))
            })
            .collect();
        self.tiered.warm_up(entries).await
    }

    // == Invalidation ==
    pub async fn invalidate(&self, event_type: &str, payload: &Value) -> Result<InvalidationResult> {
        self.invalidation.invalidate(event_type, payload).await
    }

    pub async fn invalidate_keys(&self, keys: &[String]) -> Result<InvalidationResult> {
        self.invalidation.invalidate_keys(keys).await
    }

    pub async fn invalidate_tag(&self, tag: &str) -> Result<Vec<String>> {
        self.invalidation.invalidate_tag(tag).await
    }

    /// Sender side of the domain event channel consumed by the listener task.
    pub fn events(&self) -> broadcast::Sender<DomainEvent> {
        self.events.clone()
    }

    /// Publishes an event. Returns how many listeners received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    // == Observability ==
    pub fn stats(&self) -> FacadeStats {
        FacadeStats {
            strategy: self.strategy,
            cache: self.cache.stats(),
            invalidation: self.invalidation.stats(),
            monitoring: self.monitor.is_enabled(),
        }
    }

    pub async fn health_report(&self) -> HealthReport {
        self.monitor.health_report().await
    }

    pub fn metrics_report(&self) -> MetricsReport {
        self.monitor.metrics_report()
    }

    pub fn prometheus(&self) -> String {
        self.monitor.prometheus()
    }

    /// Zeroes cache counters and drops monitor history.
    pub fn reset_stats(&self) {
        self.tiered.reset_stats();
        self.monitor.reset();
    }

    // == Lifecycle ==
    /// Spawns the background tasks. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let local = self.tiered.local().clone();
        let local_config = &self.config.local;
        tasks.push(spawn_cleanup_task(local.clone(), local_config.cleanup_interval));
        tasks.push(spawn_memory_pressure_task(
            local,
            self.memory.clone(),
            local_config.memory_check_interval,
            local_config.memory_high_water,
            local_config.memory_pressure_fraction,
        ));

        if let Some(remote) = self.tiered.remote() {
            tasks.push(spawn_reconnect_task(
                remote.clone(),
                self.config.redis.reconnect_interval,
            ));
        }

        tasks.push(spawn_event_listener(
            self.invalidation.clone(),
            self.events.subscribe(),
        ));

        if self.monitor.is_enabled() {
            tasks.push(spawn_monitor_report_task(
                self.monitor.clone(),
                self.config.monitor.report_interval,
            ));
        }

        info!(tasks = tasks.len(), "Cache background tasks started");
    }

    /// Aborts every background task.
    pub fn stop(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        info!(tasks = tasks.len(), "Cache background tasks stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }
}

impl Drop for CacheFacade {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Tier-1 lifetime under the `redis` strategy.
const REDIS_STRATEGY_LOCAL_TTL: Duration = Duration::from_secs(60);

/// Tier-1 limits for a strategy. `redis` keeps only a small, short-lived tier 1.
fn local_config(config: &Config, strategy: CacheStrategy) -> LocalCacheConfig {
    match strategy {
        CacheStrategy::Redis => LocalCacheConfig {
            max_entries: 100,
            max_memory_bytes: 10 * 1024 * 1024,
            default_ttl: REDIS_STRATEGY_LOCAL_TTL,
            ..config.local.clone()
        },
        CacheStrategy::Local | CacheStrategy::Hybrid => config.local.clone(),
    }
}

/// Tier-2 settings for a strategy. Under `redis`, promoted copies live no
/// longer than the small tier 1 itself.
fn remote_config(config: &Config, strategy: CacheStrategy) -> RedisConfig {
    let mut redis = config.redis.clone();
    if strategy == CacheStrategy::Redis {
        redis.promotion_ttl = redis.promotion_ttl.min(REDIS_STRATEGY_LOCAL_TTL);
    }
    redis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::monitor::FixedProbe;
    use crate::remote::InMemoryRemote;
    use serde_json::json;

    fn local_facade() -> CacheFacade {
        let config = Config {
            strategy: CacheStrategy::Local,
            ..Config::default()
        };
        CacheFacade::with_remote(config, None, Arc::new(FixedProbe(0.1)))
    }

    #[tokio::test]
    async fn test_from_config_without_url_degrades_to_local() {
        let facade = CacheFacade::from_config(Config::default()).await;
        assert_eq!(facade.strategy(), CacheStrategy::Local);
        assert!(facade.tiered().remote().is_none());
    }

    #[test]
    fn test_redis_strategy_shrinks_local_tier() {
        let config = Config {
            strategy: CacheStrategy::Redis,
            ..Config::default()
        };
        let remote: Arc<dyn RemoteTier> = Arc::new(InMemoryRemote::connected());
        let facade = CacheFacade::with_remote(config, Some(remote), Arc::new(FixedProbe(0.1)));

        let stats = facade.tiered().local().stats();
        assert_eq!(facade.strategy(), CacheStrategy::Redis);
        assert_eq!(stats.max_size, 100);
        assert_eq!(stats.max_memory_bytes, 10 * 1024 * 1024);
        assert_eq!(facade.tiered().promotion_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_hybrid_strategy_keeps_configured_promotion_ttl() {
        let config = Config::default();
        let expected = config.redis.promotion_ttl;
        let remote: Arc<dyn RemoteTier> = Arc::new(InMemoryRemote::connected());
        let facade = CacheFacade::with_remote(config, Some(remote), Arc::new(FixedProbe(0.1)));

        assert_eq!(facade.strategy(), CacheStrategy::Hybrid);
        assert_eq!(facade.tiered().promotion_ttl(), expected);
    }

    #[tokio::test]
    async fn test_set_uses_category_ttl() {
        let facade = local_facade();
        assert!(facade.set("dashboard:summary", json!(1), None).await);
        assert_eq!(facade.get("dashboard:summary").await.as_deref(), Some(&json!(1)));

        let entry = facade
            .tiered()
            .local()
            .entries()
            .into_iter()
            .find(|e| e.key == "dashboard:summary")
            .unwrap();
        assert!(entry.has_expiry);
    }

    #[tokio::test]
    async fn test_operations_are_recorded() {
        let facade = local_facade();
        facade.set("order:1", json!({"total": 10}), None).await;
        facade.get("order:1").await;
        facade.get("order:2").await;

        assert_eq!(facade.monitor().recorded_operations(), 3);
        let report = facade.metrics_report();
        assert_eq!(report.last_hour.categories["order"].count, 3);
    }

    #[tokio::test]
    async fn test_get_or_fetch() {
        let facade = local_facade();

        let value = facade
            .get_or_fetch("product:1", || async { Ok::<_, CacheError>(json!("fresh")) }, None)
            .await
            .unwrap();
        assert_eq!(*value, json!("fresh"));

        // Cached now, fetcher must not run
        let value = facade
            .get_or_fetch(
                "product:1",
                || async { Err::<CacheValue, _>(CacheError::Internal("unreachable".into())) },
                None,
            )
            .await
            .unwrap();
        assert_eq!(*value, json!("fresh"));
    }

    #[tokio::test]
    async fn test_get_or_fetch_propagates_errors() {
        let facade = local_facade();
        let result = facade
            .get_or_fetch(
                "product:2",
                || async { Err::<CacheValue, _>(CacheError::Internal("db down".into())) },
                None,
            )
            .await;

        assert!(result.is_err());
        assert!(!facade.has("product:2").await);
    }

    #[tokio::test]
    async fn test_published_events_invalidate_after_start() {
        let facade = local_facade();
        facade.set("customer:9", json!(1), None).await;
        facade.start();
        assert!(facade.is_running());

        let delivered = facade.publish(DomainEvent::new(
            crate::invalidation::rules::CUSTOMER_UPDATED,
            json!({"id": 9, "phone": "555-0100"}),
        ));
        assert_eq!(delivered, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!facade.has("customer:9").await);
        facade.stop();
        assert!(!facade.is_running());
    }

    #[tokio::test]
    async fn test_warm_up_and_stats() {
        let facade = local_facade();
        let loaded = facade
            .warm_up(vec![
                ("menu:all".to_string(), json!([1, 2]), None),
                ("menu:active".to_string(), json!([1]), None),
            ])
            .await;

        assert_eq!(loaded, 2);
        let stats = facade.stats();
        assert_eq!(stats.strategy, CacheStrategy::Local);
        assert_eq!(stats.cache.size(), 2);
        assert!(stats.monitoring);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let facade = local_facade();
        facade.get("missing").await;
        facade.reset_stats();

        assert_eq!(facade.stats().cache.total_reads(), 0);
        assert_eq!(facade.monitor().recorded_operations(), 0);
    }
}
