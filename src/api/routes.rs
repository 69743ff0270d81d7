//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, health_handler, invalidate_api_responses_handler, invalidate_computed_handler,
    invalidate_layer_handler, invalidate_session_handler, reset_stats_handler, stats_handler,
    warm_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/cache", delete(clear_handler))
        .route("/v1/cache/stats", get(stats_handler))
        .route("/v1/cache/stats/reset", post(reset_stats_handler))
        .route("/v1/cache/warm", post(warm_handler))
        .route(
            "/v1/cache/layers/:layer/invalidate",
            post(invalidate_layer_handler),
        )
        .route(
            "/v1/cache/sessions/:year/:event/invalidate",
            post(invalidate_session_handler),
        )
        .route(
            "/v1/cache/computed/invalidate",
            post(invalidate_computed_handler),
        )
        .route(
            "/v1/cache/api-responses/invalidate",
            post(invalidate_api_responses_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAside, KeyBuilder, MemoryStore, TtlPolicy};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let cache = CacheAside::new(
            Arc::new(MemoryStore::new(100)),
            KeyBuilder::new("f1").unwrap(),
            TtlPolicy::default(),
        );
        create_router(AppState::new(cache))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        create_test_app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(status_of("GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        assert_eq!(status_of("GET", "/v1/cache/stats").await, StatusCode::OK);
        assert_eq!(
            status_of("POST", "/v1/cache/stats/reset").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_invalidate_routes() {
        assert_eq!(status_of("DELETE", "/v1/cache").await, StatusCode::OK);
        assert_eq!(
            status_of("POST", "/v1/cache/layers/computed/invalidate").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of("POST", "/v1/cache/sessions/2024/Monaco/invalidate?session=Q").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of("POST", "/v1/cache/computed/invalidate?year=2024&metric=pace").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of("POST", "/v1/cache/api-responses/invalidate?endpoint=/laps").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_unknown_layer_is_bad_request() {
        assert_eq!(
            status_of("POST", "/v1/cache/layers/weather/invalidate").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_wrong_method_not_allowed() {
        assert_eq!(
            status_of("GET", "/v1/cache/warm").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
