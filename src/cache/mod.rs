//! Cache Module
//!
//! Tier-1 in-process caching with TTL expiration, LRU eviction and an
//! approximate memory ceiling.

mod entry;
mod expiry;
mod local;
mod lru;
mod pattern;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, estimate_size, CacheEntry};
pub use expiry::ExpiryQueue;
pub use local::LocalCache;
pub use lru::LruTracker;
pub use pattern::GlobPattern;
pub use stats::{CacheStats, LocalCacheStats};
pub use store::{CacheStore, EntryInfo};

/// Values held by every tier.
pub type CacheValue = serde_json::Value;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
