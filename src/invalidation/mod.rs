//! Invalidation Module
//!
//! Resolves domain events into key sets and removes them from a cache
//! layer, following registered dependencies one level and tag groups.

pub mod rules;

pub use rules::{default_rules, event_type_for_topic, normalize_date, RuleFn};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::cache::GlobPattern;
use crate::error::{CacheError, Result};
use crate::layer::CacheLayer;

/// Event type reported for direct key invalidations.
pub const DIRECT_EVENT: &str = "DIRECT";

// == Domain Event ==
/// A domain event published on the invalidation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Builds an event from an emitter topic such as `order:created`.
    pub fn from_topic(topic: &str, payload: Value) -> Option<Self> {
        event_type_for_topic(topic).map(|event_type| Self::new(event_type, payload))
    }
}

// == Results and Stats ==
/// Summary of one `invalidate` call.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResult {
    pub event_type: String,
    pub invalidated_keys: Vec<String>,
    pub cascade_keys: Vec<String>,
    pub total_invalidated: usize,
}

#[derive(Debug, Default)]
struct Counters {
    invalidations: AtomicU64,
    cascade_invalidations: AtomicU64,
    tag_invalidations: AtomicU64,
    rule_based_invalidations: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidationStats {
    pub invalidations: u64,
    pub cascade_invalidations: u64,
    pub tag_invalidations: u64,
    pub rule_based_invalidations: u64,
    pub errors: u64,
    pub registered_rules: usize,
    pub tracked_dependencies: usize,
    pub active_tags: usize,
    /// Sum of dependent keys across all triggers
    pub dependency_edges: usize,
    /// Sum of member keys across all tags
    pub tagged_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyExport {
    pub key: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagExport {
    pub tag: String,
    pub keys: Vec<String>,
}

/// Snapshot of rules, dependencies and tags for debugging or backup.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationConfig {
    pub rules: Vec<String>,
    pub dependencies: Vec<DependencyExport>,
    pub tags: Vec<TagExport>,
}

// == Invalidation Manager ==
/// Event-driven invalidation over any `CacheLayer`.
///
/// Dependency and tag indexes are not pruned when their keys expire or are
/// evicted; they shrink only through tag consumption or `clear`. Their
/// sizes are reported in `stats`.
pub struct InvalidationManager {
    cache: Arc<dyn CacheLayer>,
    rules: RwLock<HashMap<String, RuleFn>>,
    dependencies: RwLock<BTreeMap<String, BTreeSet<String>>>,
    tags: RwLock<BTreeMap<String, BTreeSet<String>>>,
    counters: Counters,
}

impl InvalidationManager {
    /// Creates a manager with the default rule set registered.
    pub fn new(cache: Arc<dyn CacheLayer>) -> Self {
        let manager = Self::without_rules(cache);
        for (event_type, rule) in default_rules() {
            manager.rules.write().insert(event_type.to_string(), rule);
        }
        manager
    }

    /// Creates a manager with no rules.
    pub fn without_rules(cache: Arc<dyn CacheLayer>) -> Self {
        Self {
            cache,
            rules: RwLock::new(HashMap::new()),
            dependencies: RwLock::new(BTreeMap::new()),
            tags: RwLock::new(BTreeMap::new()),
            counters: Counters::default(),
        }
    }

    // == Registration ==
    /// Registers a resolver, replacing any prior one for the event type.
    pub fn add_rule<F>(&self, event_type: &str, rule: F)
    where
        F: Fn(&Value) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        self.rules
            .write()
            .insert(event_type.to_string(), Arc::new(rule));
    }

    /// Adds dependents to a trigger's cascade set (union).
    pub fn add_dependency<I, S>(&self, trigger: &str, dependents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .write()
            .entry(trigger.to_string())
            .or_default()
            .extend(dependents.into_iter().map(Into::into));
    }

    /// Adds a key to each named tag.
    pub fn add_tag<I, S>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = self.tags.write();
        for tag in tags {
            index.entry(tag.into()).or_default().insert(key.to_string());
        }
    }

    // == Invalidate ==
    /// Resolves an event through its rule and invalidates the result, then
    /// cascades one level through the dependency graph.
    ///
    /// Rule and direct-delete failures are counted and returned. Cascade
    /// failures are counted and logged only.
    pub async fn invalidate(&self, event_type: &str, payload: &Value) -> Result<InvalidationResult> {
        let rule = self.rules.read().get(event_type).cloned();

        let keys = match rule {
            Some(rule) => match rule(payload) {
                Ok(keys) => keys,
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    error!(event = %event_type, error = %e, "Invalidation rule failed");
                    return Err(CacheError::Rule {
                        event: event_type.to_string(),
                        message: e.to_string(),
                    });
                }
            },
            None => {
                debug!(event = %event_type, "No invalidation rule registered");
                Vec::new()
            }
        };
        Counters::add(&self.counters.rule_based_invalidations, keys.len());

        self.run(event_type, dedupe(keys)).await
    }

    /// Invalidates explicit keys or patterns, with cascade.
    pub async fn invalidate_keys(&self, keys: &[String]) -> Result<InvalidationResult> {
        self.run(DIRECT_EVENT, dedupe(keys.to_vec())).await
    }

    async fn run(&self, event_type: &str, keys: Vec<String>) -> Result<InvalidationResult> {
        let invalidated_keys = match self.remove_keys(&keys).await {
            Ok(keys) => keys,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                error!(event = %event_type, error = %e, "Invalidation failed");
                return Err(e);
            }
        };

        let cascade_keys = self.cascade(&invalidated_keys).await;

        Counters::add(&self.counters.invalidations, invalidated_keys.len());
        Counters::add(&self.counters.cascade_invalidations, cascade_keys.len());
        debug!(
            event = %event_type,
            direct = invalidated_keys.len(),
            cascade = cascade_keys.len(),
            "Invalidated"
        );

        Ok(InvalidationResult {
            event_type: event_type.to_string(),
            total_invalidated: invalidated_keys.len() + cascade_keys.len(),
            invalidated_keys,
            cascade_keys,
        })
    }

    /// Routes patterns to pattern invalidation and plain keys to one batched
    /// delete. Any tier failing to delete is an error.
    async fn remove_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        let (patterns, concrete): (Vec<&String>, Vec<&String>) =
            keys.iter().partition(|key| GlobPattern::is_pattern(key));

        if !concrete.is_empty() {
            let concrete: Vec<String> = concrete.into_iter().cloned().collect();
            self.cache.invalidate(&concrete).await?;
        }
        for pattern in patterns {
            self.cache.invalidate_pattern(pattern).await?;
        }
        Ok(keys.to_vec())
    }

    /// One level of dependents of the given keys, deduplicated.
    async fn cascade(&self, keys: &[String]) -> Vec<String> {
        let dependents: Vec<String> = {
            let graph = self.dependencies.read();
            let mut seen = BTreeSet::new();
            keys.iter()
                .filter_map(|key| graph.get(key))
                .flatten()
                .filter(|dep| seen.insert((*dep).clone()))
                .cloned()
                .collect()
        };

        if dependents.is_empty() {
            return dependents;
        }

        if let Err(e) = self.remove_keys(&dependents).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Cascade invalidation incomplete");
        }
        dependents
    }

    // == Tags ==
    /// Invalidates every key under a tag and discards the tag.
    ///
    /// Returns an empty list for unknown or already consumed tags.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<Vec<String>> {
        let members: Vec<String> = match self.tags.read().get(tag) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        let invalidated = match self.remove_keys(&members).await {
            Ok(keys) => keys,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                error!(tag = %tag, error = %e, "Tag invalidation failed");
                return Err(e);
            }
        };

        self.tags.write().remove(tag);
        Counters::add(&self.counters.tag_invalidations, invalidated.len());
        Ok(invalidated)
    }

    // == Maintenance ==
    /// Drops dependency and tag state. Rules are kept.
    pub fn clear(&self) {
        self.dependencies.write().clear();
        self.tags.write().clear();
    }

    pub fn stats(&self) -> InvalidationStats {
        let dependencies = self.dependencies.read();
        let tags = self.tags.read();
        InvalidationStats {
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            cascade_invalidations: self.counters.cascade_invalidations.load(Ordering::Relaxed),
            tag_invalidations: self.counters.tag_invalidations.load(Ordering::Relaxed),
            rule_based_invalidations: self
                .counters
                .rule_based_invalidations
                .load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            registered_rules: self.rules.read().len(),
            tracked_dependencies: dependencies.len(),
            active_tags: tags.len(),
            dependency_edges: dependencies.values().map(BTreeSet::len).sum(),
            tagged_keys: tags.values().map(BTreeSet::len).sum(),
        }
    }

    pub fn export_configuration(&self) -> InvalidationConfig {
        let mut rules: Vec<String> = self.rules.read().keys().cloned().collect();
        rules.sort();

        InvalidationConfig {
            rules,
            dependencies: self
                .dependencies
                .read()
                .iter()
                .map(|(key, deps)| DependencyExport {
                    key: key.clone(),
                    dependencies: deps.iter().cloned().collect(),
                })
                .collect(),
            tags: self
                .tags
                .read()
                .iter()
                .map(|(tag, keys)| TagExport {
                    tag: tag.clone(),
                    keys: keys.iter().cloned().collect(),
                })
                .collect(),
        }
    }
}

/// Removes duplicates, keeping first occurrences in order.
fn dedupe(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}
