//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::config::CacheStrategy;
use crate::remote::ConnectionState;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /pattern/:pattern
#[derive(Debug, Clone, Serialize)]
pub struct PatternDeleteResponse {
    pub pattern: String,
    /// Entries removed from the local tier
    pub deleted: usize,
}

/// Response body for POST /invalidate/tag/:tag
#[derive(Debug, Clone, Serialize)]
pub struct TagInvalidationResponse {
    pub tag: String,
    pub invalidated: Vec<String>,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the liveness endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    pub strategy: CacheStrategy,
    /// Remote tier state, absent when only the local tier runs
    pub remote: Option<ConnectionState>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(strategy: CacheStrategy, remote: Option<ConnectionState>) -> Self {
        Self {
            status: "healthy".to_string(),
            strategy,
            remote,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
