//! Integration Tests for Invalidation
//!
//! Pattern, cascade, tag and rule-driven invalidation over the tiered
//! cache, including remote failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tiered_cache::config::RedisConfig;
use tiered_cache::invalidation::rules;
use tiered_cache::layer::{HealthCheck, LayerStats};
use tiered_cache::remote::{InMemoryRemote, RemoteTier};
use tiered_cache::{
    CacheError, CacheLayer, CacheValue, InvalidationManager, LocalCache, TieredCache,
};

// == Helper Functions ==

fn setup() -> (Arc<InMemoryRemote>, Arc<TieredCache>, InvalidationManager) {
    let remote = Arc::new(InMemoryRemote::connected());
    let config = RedisConfig {
        url: Some("memory://".to_string()),
        timeout_ms: 100,
        ..RedisConfig::default()
    };
    let local = LocalCache::with_limits(100, 1024 * 1024, Duration::from_secs(60));
    let dyn_remote: Arc<dyn RemoteTier> = remote.clone();
    let cache = Arc::new(TieredCache::new(local, Some(dyn_remote), &config));
    let manager = InvalidationManager::new(cache.clone());
    (remote, cache, manager)
}

async fn seed(cache: &TieredCache, keys: &[&str]) {
    for key in keys {
        assert!(cache.set(key, json!(key), None).await);
    }
}

// == Pattern ==

#[tokio::test]
async fn test_pattern_invalidation_leaves_other_keys() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["user:1", "user:2", "order:1"]).await;

    manager.invalidate_keys(&["user:*".to_string()]).await.unwrap();

    assert!(cache.get("user:1").await.is_none());
    assert!(cache.get("user:2").await.is_none());
    assert_eq!(cache.get("order:1").await.as_deref(), Some(&json!("order:1")));
    assert!(remote.raw("cache:user:1").is_none());
    assert!(remote.raw("cache:order:1").is_some());
}

// == Cascade ==

#[tokio::test]
async fn test_cascade_reports_direct_and_cascade_keys() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["parent", "child1", "child2", "bystander"]).await;
    manager.add_dependency("parent", ["child1", "child2"]);

    let result = manager.invalidate_keys(&["parent".to_string()]).await.unwrap();

    assert_eq!(result.invalidated_keys, vec!["parent".to_string()]);
    assert_eq!(
        result.cascade_keys,
        vec!["child1".to_string(), "child2".to_string()]
    );
    assert_eq!(result.total_invalidated, 3);
    assert!(!cache.has("child1").await);
    assert!(!cache.has("child2").await);
    assert!(cache.has("bystander").await);
    assert!(remote.raw("cache:child2").is_none());

    let stats = manager.stats();
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.cascade_invalidations, 2);
}

#[tokio::test]
async fn test_cycle_in_dependencies_terminates() {
    let (_remote, cache, manager) = setup();
    seed(&cache, &["a", "b"]).await;
    manager.add_dependency("a", ["b"]);
    manager.add_dependency("b", ["a"]);

    let result = manager.invalidate_keys(&["a".to_string()]).await.unwrap();

    assert_eq!(result.cascade_keys, vec!["b".to_string()]);
    assert!(!cache.has("b").await);
}

// == Tags ==

#[tokio::test]
async fn test_tag_invalidation_is_one_shot() {
    let (_remote, cache, manager) = setup();
    seed(&cache, &["k1", "k2", "k3"]).await;
    manager.add_tag("k1", ["T"]);
    manager.add_tag("k2", ["T"]);
    manager.add_tag("k3", ["U"]);

    let first = manager.invalidate_tag("T").await.unwrap();
    assert_eq!(first, vec!["k1".to_string(), "k2".to_string()]);
    assert!(!cache.has("k1").await);
    assert!(!cache.has("k2").await);
    assert!(cache.has("k3").await);

    let second = manager.invalidate_tag("T").await.unwrap();
    assert!(second.is_empty());
    assert_eq!(manager.stats().tag_invalidations, 2);
    assert_eq!(manager.stats().active_tags, 1);
}

// == Rules ==

#[tokio::test]
async fn test_order_delivered_rule() {
    let (_remote, cache, manager) = setup();
    seed(
        &cache,
        &[
            "order:17",
            "deliveries:pending",
            "deliveries:completed:2024-05-01",
            "deliverer:3:stats",
            "deliveries:completed:2024-04-30",
        ],
    )
    .await;

    let result = manager
        .invalidate(
            rules::ORDER_DELIVERED,
            &json!({"id": 17, "delivererId": 3, "date": "2024-05-01T18:45:00Z"}),
        )
        .await
        .unwrap();

    assert_eq!(result.event_type, rules::ORDER_DELIVERED);
    assert!(!cache.has("order:17").await);
    assert!(!cache.has("deliverer:3:stats").await);
    assert!(!cache.has("deliveries:completed:2024-05-01").await);
    assert!(cache.has("deliveries:completed:2024-04-30").await);
}

// == Failures ==

#[tokio::test]
async fn test_remote_failure_surfaces_on_pattern_invalidation() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["menu:all"]).await;
    remote.set_failing(true);

    let result = manager.invalidate(rules::MENU_UPDATED, &json!({})).await;

    assert!(matches!(result, Err(CacheError::Remote(_))));
    assert_eq!(manager.stats().errors, 1);
    // Local tier is still cleared before the remote step fails
    assert!(!cache.local().has("menu:all"));
}

#[tokio::test]
async fn test_failed_remote_delete_is_raised_and_retryable() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["order:1"]).await;
    remote.set_failing(true);

    let result = manager.invalidate_keys(&["order:1".to_string()]).await;

    assert!(matches!(result, Err(CacheError::Remote(_))));
    assert_eq!(manager.stats().errors, 1);
    assert!(remote.raw("cache:order:1").is_some());

    remote.set_failing(false);
    manager.invalidate_keys(&["order:1".to_string()]).await.unwrap();
    assert!(cache.get("order:1").await.is_none());
    assert!(remote.raw("cache:order:1").is_none());
}

#[tokio::test]
async fn test_rule_keys_fail_when_remote_delete_fails() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["product:5", "menu:all"]).await;
    remote.set_failing(true);

    let result = manager
        .invalidate(rules::PRODUCT_UPDATED, &json!({"id": 5, "category": "pizza"}))
        .await;

    assert!(matches!(result, Err(CacheError::Remote(_))));
    assert!(remote.raw("cache:product:5").is_some());
}

#[tokio::test]
async fn test_failed_tag_invalidation_keeps_tag() {
    let (remote, cache, manager) = setup();
    seed(&cache, &["k1", "k2"]).await;
    manager.add_tag("k1", ["T"]);
    manager.add_tag("k2", ["T"]);
    remote.set_failing(true);

    assert!(manager.invalidate_tag("T").await.is_err());
    assert_eq!(manager.stats().errors, 1);
    assert_eq!(manager.stats().active_tags, 1);

    remote.set_failing(false);
    let invalidated = manager.invalidate_tag("T").await.unwrap();
    assert_eq!(invalidated, vec!["k1".to_string(), "k2".to_string()]);
    assert!(remote.raw("cache:k1").is_none());
    assert_eq!(manager.stats().active_tags, 0);
}

#[tokio::test]
async fn test_partial_payload_still_invalidates_static_keys() {
    let (_remote, cache, manager) = setup();
    seed(&cache, &["product:5", "menu:all", "menu:active"]).await;

    let result = manager
        .invalidate(rules::PRODUCT_UPDATED, &json!({"id": 5}))
        .await
        .unwrap();

    assert_eq!(result.total_invalidated, 4);
    assert!(!cache.has("product:5").await);
    assert!(!cache.has("menu:all").await);
    assert!(!cache.has("menu:active").await);
}

// == Cascade failures ==

/// Tiered cache whose pattern invalidation always fails.
struct BrokenPatterns(Arc<TieredCache>);

#[async_trait]
impl CacheLayer for BrokenPatterns {
    async fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> bool {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> bool {
        self.0.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> usize {
        self.0.delete_many(keys).await
    }

    async fn has(&self, key: &str) -> bool {
        self.0.has(key).await
    }

    async fn invalidate(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.0.invalidate(keys).await
    }

    async fn invalidate_pattern(&self, _pattern: &str) -> Result<usize, CacheError> {
        Err(CacheError::Remote("scan failed".to_string()))
    }

    async fn clear(&self) {
        self.0.clear().await
    }

    fn stats(&self) -> LayerStats {
        LayerStats::Tiered(self.0.stats())
    }

    async fn health_check(&self) -> HealthCheck {
        self.0.health_check().await
    }
}

#[tokio::test]
async fn test_cascade_failure_is_counted_not_raised() {
    let (remote, cache, _) = setup();
    seed(&cache, &["parent", "child:1"]).await;
    let manager = InvalidationManager::new(Arc::new(BrokenPatterns(cache.clone())));
    manager.add_dependency("parent", ["child:*"]);

    let result = manager.invalidate_keys(&["parent".to_string()]).await.unwrap();

    assert_eq!(result.invalidated_keys, vec!["parent".to_string()]);
    assert_eq!(result.cascade_keys, vec!["child:*".to_string()]);
    assert_eq!(manager.stats().errors, 1);
    assert!(remote.raw("cache:parent").is_none());
    assert!(remote.raw("cache:child:1").is_some());
}
