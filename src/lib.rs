//! Tiered Cache - a two-tier cache engine
//!
//! A bounded in-process LRU/TTL tier in front of an optional Redis tier,
//! with event-driven invalidation, monitoring and an axum admin API.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod invalidation;
pub mod layer;
pub mod models;
pub mod monitor;
pub mod remote;
pub mod tasks;
pub mod tiered;

pub use api::AppState;
pub use cache::{CacheValue, LocalCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use facade::{CacheFacade, Monitored};
pub use invalidation::{DomainEvent, InvalidationManager};
pub use layer::CacheLayer;
pub use monitor::CacheMonitor;
pub use tiered::TieredCache;
