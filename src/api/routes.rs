//! API Routes
//!
//! Configures the Axum router with all admin and observability endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_health_handler, cache_metrics_handler, clear_handler, delete_handler,
    dependency_handler, get_handler, health_handler, invalidate_handler, invalidate_tag_handler,
    invalidation_config_handler, pattern_delete_handler, prometheus_handler, reset_stats_handler,
    set_handler, stats_handler, tag_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Liveness
/// - `GET /metrics/cache/health` - Monitor health report
/// - `GET /metrics/cache/detailed` - Windowed metrics report
/// - `GET /metrics/cache/prometheus` - Prometheus text exposition
/// - `GET /stats`, `POST /stats/reset` - Engine statistics
/// - `PUT /set`, `GET /get/:key`, `DELETE /del/:key` - Key operations
/// - `DELETE /pattern/:pattern`, `DELETE /clear` - Bulk removal
/// - `POST /invalidate`, `POST /invalidate/tag/:tag` - Invalidation
/// - `POST /tags/:tag`, `POST /dependencies` - Tag and dependency registration
/// - `GET /invalidation/config` - Rules, dependencies and tags
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics/cache/health", get(cache_health_handler))
        .route("/metrics/cache/detailed", get(cache_metrics_handler))
        .route("/metrics/cache/prometheus", get(prometheus_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/pattern/:pattern", delete(pattern_delete_handler))
        .route("/clear", delete(clear_handler))
        .route("/invalidate", post(invalidate_handler))
        .route("/invalidate/tag/:tag", post(invalidate_tag_handler))
        .route("/tags/:tag", post(tag_handler))
        .route("/dependencies", post(dependency_handler))
        .route("/invalidation/config", get(invalidation_config_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheStrategy, Config};
    use crate::facade::CacheFacade;
    use crate::monitor::FixedProbe;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let config = Config {
            strategy: CacheStrategy::Local,
            ..Config::default()
        };
        let facade = CacheFacade::with_remote(config, None, Arc::new(FixedProbe(0.1)));
        create_router(AppState::new(Arc::new(facade)))
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        create_test_app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        for uri in [
            "/metrics/cache/health",
            "/metrics/cache/detailed",
            "/metrics/cache/prometheus",
            "/stats",
            "/invalidation/config",
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            assert_eq!(status_of(request).await, StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let request = Request::builder()
            .method("PUT")
            .uri("/set")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"key":"test","value":{"n":1}}"#))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let request = Request::builder()
            .uri("/get/nonexistent")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_invalidation_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/invalidate")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);
    }
}
