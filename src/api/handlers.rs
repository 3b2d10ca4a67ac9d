//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::info;

use crate::error::{CacheError, Result};
use crate::facade::{CacheFacade, FacadeStats};
use crate::invalidation::{InvalidationConfig, InvalidationResult};
use crate::models::{
    DeleteResponse, DependencyRequest, GetResponse, HealthResponse, InvalidateRequest,
    MessageResponse, PatternDeleteResponse, SetRequest, SetResponse, TagInvalidationResponse,
    TagRequest,
};
use crate::monitor::{HealthReport, MetricsReport, MonitorStatus};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<CacheFacade>,
}

impl AppState {
    pub fn new(facade: Arc<CacheFacade>) -> Self {
        Self { facade }
    }
}

// == Key Operations ==
/// Handler for PUT /set
///
/// Stores a JSON value. Without `ttl` the key's category TTL applies;
/// `ttl: 0` stores it without expiry.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.map(Duration::from_secs);
    if !state.facade.set(&req.key, req.value, ttl).await {
        return Err(CacheError::InvalidRequest(format!(
            "Value for key '{}' was rejected",
            req.key
        )));
    }

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .facade
        .get(&key)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value.as_ref().clone())))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.facade.delete(&key).await {
        return Err(CacheError::NotFound(key));
    }
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /pattern/:pattern
pub async fn pattern_delete_handler(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> Result<Json<PatternDeleteResponse>> {
    let deleted = state.facade.invalidate_pattern(&pattern).await?;
    Ok(Json(PatternDeleteResponse { pattern, deleted }))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.facade.clear().await;
    info!("Cache cleared via API");
    Json(MessageResponse::new("Cache cleared"))
}

// == Invalidation ==
/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidationResult>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let result = match &req.event_type {
        Some(event_type) => state.facade.invalidate(event_type, &req.payload).await?,
        None => state.facade.invalidate_keys(&req.keys).await?,
    };
    Ok(Json(result))
}

/// Handler for POST /invalidate/tag/:tag
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<TagInvalidationResponse>> {
    let invalidated = state.facade.invalidate_tag(&tag).await?;
    Ok(Json(TagInvalidationResponse { tag, invalidated }))
}

/// Handler for POST /tags/:tag
pub async fn tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<TagRequest>,
) -> Json<MessageResponse> {
    let manager = state.facade.invalidation();
    for key in &req.keys {
        manager.add_tag(key, [tag.as_str()]);
    }
    Json(MessageResponse::new(format!(
        "Tagged {} keys with '{}'",
        req.keys.len(),
        tag
    )))
}

/// Handler for POST /dependencies
pub async fn dependency_handler(
    State(state): State<AppState>,
    Json(req): Json<DependencyRequest>,
) -> Json<MessageResponse> {
    state
        .facade
        .invalidation()
        .add_dependency(&req.key, req.dependents.iter().cloned());
    Json(MessageResponse::new(format!(
        "Registered {} dependents for '{}'",
        req.dependents.len(),
        req.key
    )))
}

/// Handler for GET /invalidation/config
pub async fn invalidation_config_handler(State(state): State<AppState>) -> Json<InvalidationConfig> {
    Json(state.facade.invalidation().export_configuration())
}

// == Observability ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<FacadeStats> {
    Json(state.facade.stats())
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.facade.reset_stats();
    Json(MessageResponse::new("Statistics reset"))
}

/// Handler for GET /health
///
/// Liveness only; the detailed report lives under /metrics/cache/health.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let remote = state.facade.tiered().remote().map(|remote| remote.state());
    Json(HealthResponse::healthy(state.facade.strategy(), remote))
}

/// Handler for GET /metrics/cache/health
///
/// Responds 503 while the status is critical.
pub async fn cache_health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.facade.health_report().await;
    let status = if report.status == MonitorStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

/// Handler for GET /metrics/cache/detailed
pub async fn cache_metrics_handler(State(state): State<AppState>) -> Json<MetricsReport> {
    Json(state.facade.metrics_report())
}

/// Handler for GET /metrics/cache/prometheus
pub async fn prometheus_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.facade.prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheStrategy, Config};
    use crate::monitor::FixedProbe;
    use serde_json::json;

    fn state() -> AppState {
        let config = Config {
            strategy: CacheStrategy::Local,
            ..Config::default()
        };
        let facade = CacheFacade::with_remote(config, None, Arc::new(FixedProbe(0.1)));
        AppState::new(Arc::new(facade))
    }

    fn set_request(key: &str, value: serde_json::Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = state();

        let result = set_handler(State(state.clone()), Json(set_request("test_key", json!("v")))).await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!("v"));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let result = get_handler(State(state()), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("to_delete", json!(1))))
            .await
            .unwrap();

        assert!(delete_handler(State(state.clone()), Path("to_delete".to_string()))
            .await
            .is_ok());
        assert!(delete_handler(State(state), Path("to_delete".to_string()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let result = set_handler(State(state()), Json(set_request("", json!(1)))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalidate_by_keys() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("user:1", json!(1))))
            .await
            .unwrap();

        let req = InvalidateRequest {
            event_type: None,
            payload: json!(null),
            keys: vec!["user:*".to_string()],
        };
        let result = invalidate_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(result.invalidated_keys, vec!["user:*".to_string()]);
        assert!(!state.facade.has("user:1").await);
    }

    #[tokio::test]
    async fn test_tag_then_invalidate_tag() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("menu:all", json!([]))))
            .await
            .unwrap();
        tag_handler(
            State(state.clone()),
            Path("menu".to_string()),
            Json(TagRequest {
                keys: vec!["menu:all".to_string()],
            }),
        )
        .await;

        let response = invalidate_tag_handler(State(state.clone()), Path("menu".to_string()))
            .await
            .unwrap();
        assert_eq!(response.invalidated, vec!["menu:all".to_string()]);
        assert!(!state.facade.has("menu:all").await);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(state())).await;
        assert_eq!(response.status, "healthy");
        assert!(response.remote.is_none());
    }
}
