//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::MAX_KEY_LENGTH;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds; the key's category TTL applies if omitted
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds, 0 for no expiry
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}

/// Request body for POST /invalidate
///
/// Either an event (`event_type` plus `payload`) resolved through the
/// registered rules, or an explicit list of keys and patterns.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub keys: Vec<String>,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        match (&self.event_type, self.keys.is_empty()) {
            (Some(_), false) => Some("Provide either event_type or keys, not both".to_string()),
            (None, true) => Some("Provide event_type or a non-empty keys list".to_string()),
            (Some(event), true) if event.trim().is_empty() => {
                Some("event_type cannot be empty".to_string())
            }
            _ => None,
        }
    }
}

/// Request body for POST /tags/:tag
#[derive(Debug, Clone, Deserialize)]
pub struct TagRequest {
    pub keys: Vec<String>,
}

/// Request body for POST /dependencies
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyRequest {
    pub key: String,
    pub dependents: Vec<String>,
}
