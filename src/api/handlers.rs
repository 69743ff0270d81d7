//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use tracing::{info, warn};

use crate::cache::{CacheAside, KeyBuilder, Layer, Store, TtlPolicy, WarmReport};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ApiInvalidateQuery, ClearQuery, ComputedInvalidateQuery, HealthResponse, RemovedResponse,
    SessionInvalidateQuery, StatsResponse, WarmRequest,
};
use crate::tasks::{SeedWarmSource, WarmSource};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: Arc<CacheAside>,
    pub warm_source: Arc<dyn WarmSource>,
}

impl AppState {
    /// Creates a new AppState with nothing to warm.
    pub fn new(cache: CacheAside) -> Self {
        Self::with_warm_source(cache, Arc::new(SeedWarmSource::default()))
    }

    pub fn with_warm_source(cache: CacheAside, warm_source: Arc<dyn WarmSource>) -> Self {
        Self {
            cache: Arc::new(cache),
            warm_source,
        }
    }

    /// Creates a new AppState from configuration on top of `store`.
    ///
    /// Loads the warm seed file when one is configured.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let keys = KeyBuilder::new(config.key_namespace.as_str())
            .with_context(|| format!("Invalid key namespace '{}'", config.key_namespace))?;
        let cache = CacheAside::new(store, keys, TtlPolicy::new(config.default_ttl))
            .with_enabled(config.cache_enabled)
            .with_max_ttl(config.max_ttl);

        let warm_source = match &config.warm_seed_path {
            Some(path) => SeedWarmSource::from_path(path)?,
            None => SeedWarmSource::default(),
        };

        Ok(Self::with_warm_source(cache, Arc::new(warm_source)))
    }

    fn stats_response(&self) -> StatsResponse {
        StatsResponse::new(
            self.cache.stats(),
            self.cache.store().backend(),
            self.cache.is_enabled(),
        )
    }
}

/// Handler for GET /health
///
/// Pings the store. Always answers 200; an unreachable store reports "degraded".
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.cache.store();
    let started = Instant::now();
    let connected = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: store ping failed: {}", e);
            false
        }
    };
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    Json(HealthResponse::new(connected, latency_ms, store.backend()))
}

/// Handler for GET /v1/cache/stats
///
/// The counters live in-process, so an unreachable store only blanks
/// `memory_bytes` and `layer_counts`.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let memory_bytes = match state.cache.store().memory_usage().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Stats: memory usage unavailable: {}", e);
            None
        }
    };
    let layer_counts = match state.cache.layer_counts().await {
        Ok(counts) => counts,
        Err(e) => {
            warn!("Stats: layer counts unavailable: {}", e);
            Vec::new()
        }
    };

    Json(
        state
            .stats_response()
            .with_memory_bytes(memory_bytes)
            .with_layer_counts(layer_counts),
    )
}

/// Handler for POST /v1/cache/stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    state.cache.reset_stats();
    info!("Cache statistics reset");
    Json(state.stats_response())
}

/// Handler for POST /v1/cache/warm
///
/// The body is optional; `{"layer": "..."}` limits the batch to one layer.
pub async fn warm_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<WarmReport>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        WarmRequest::default()
    } else {
        serde_json::from_slice::<WarmRequest>(&body)
            .map_err(|e| CacheError::InvalidRequest(format!("Invalid warm request: {}", e)))?
    };

    let tasks = state.warm_source.tasks(&state.cache, request.layer)?;
    Ok(Json(state.cache.warm(tasks).await))
}

/// Handler for DELETE /v1/cache
///
/// Deletes keys matching `?pattern=`, or the whole namespace without one.
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<RemovedResponse>> {
    let (removed, target) = match query.validated_pattern()? {
        Some(pattern) => (
            state.cache.invalidate_pattern(pattern).await?,
            pattern.to_string(),
        ),
        None => (
            state.cache.invalidate_all().await?,
            state.cache.keys().namespace_glob(),
        ),
    };

    Ok(Json(RemovedResponse::new(removed, target)))
}

/// Handler for POST /v1/cache/layers/:layer/invalidate
pub async fn invalidate_layer_handler(
    State(state): State<AppState>,
    Path(layer): Path<String>,
) -> Result<Json<RemovedResponse>> {
    let layer: Layer = layer.parse()?;
    let removed = state.cache.invalidate_layer(layer).await?;
    let target = state.cache.keys().layer_pattern(layer).glob();

    Ok(Json(RemovedResponse::new(removed, target)))
}

/// Handler for POST /v1/cache/sessions/:year/:event/invalidate
pub async fn invalidate_session_handler(
    State(state): State<AppState>,
    Path((year, event)): Path<(i32, String)>,
    Query(query): Query<SessionInvalidateQuery>,
) -> Result<Json<RemovedResponse>> {
    let session = query.session.as_deref();
    let removed = state
        .cache
        .invalidate_session(year, &event, session)
        .await?;

    let target = match session {
        Some(session) => format!("{}/{}/{}", year, event, session),
        None => format!("{}/{}", year, event),
    };
    Ok(Json(RemovedResponse::new(removed, target)))
}

/// Handler for POST /v1/cache/computed/invalidate
///
/// `?year=&event=&metric=` narrow the selection; none drops the whole layer.
pub async fn invalidate_computed_handler(
    State(state): State<AppState>,
    Query(query): Query<ComputedInvalidateQuery>,
) -> Result<Json<RemovedResponse>> {
    let removed = state
        .cache
        .invalidate_computed(query.year, query.event.as_deref(), query.metric.as_deref())
        .await?;

    let target = [
        query.metric.clone(),
        query.year.map(|y| y.to_string()),
        query.event.clone(),
    ]
    .into_iter()
    .map(|part| part.unwrap_or_else(|| "*".to_string()))
    .collect::<Vec<_>>()
    .join("/");
    Ok(Json(RemovedResponse::new(removed, format!("computed/{}", target))))
}

/// Handler for POST /v1/cache/api-responses/invalidate
pub async fn invalidate_api_responses_handler(
    State(state): State<AppState>,
    Query(query): Query<ApiInvalidateQuery>,
) -> Result<Json<RemovedResponse>> {
    let endpoint = query.endpoint.as_deref();
    let removed = state.cache.invalidate_api_responses(endpoint).await?;

    Ok(Json(RemovedResponse::new(
        removed,
        endpoint.unwrap_or("all endpoints"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, RedisStore, RedisStoreConfig};
    use crate::tasks::SeedEntry;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn memory_state() -> AppState {
        let cache = CacheAside::new(
            Arc::new(MemoryStore::new(100)),
            KeyBuilder::new("f1").unwrap(),
            TtlPolicy::default(),
        );
        AppState::new(cache)
    }

    fn unreachable_state() -> AppState {
        let config = RedisStoreConfig::new("redis://127.0.0.1:1")
            .with_connect_timeout(Duration::from_millis(300));
        let cache = CacheAside::new(
            Arc::new(RedisStore::new(config).unwrap()),
            KeyBuilder::new("f1").unwrap(),
            TtlPolicy::default(),
        );
        AppState::new(cache)
    }

    async fn seed_sessions(state: &AppState) {
        let keys = state.cache.keys();
        for (event, session) in [("Monaco", "Q"), ("Monaco", "R"), ("Imola", "R")] {
            let key = keys.session_data(2024, event, session).unwrap();
            state.cache.set(&key, &json!({"laps": 78}), 600).await.unwrap();
        }
        let teams = keys.reference("teams", None).unwrap();
        state.cache.set(&teams, &json!(["RBR"]), 600).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_handler_memory() {
        let response = health_handler(State(memory_state())).await;
        assert_eq!(response.status, "healthy");
        assert!(response.store_connected);
        assert_eq!(response.backend, "memory");
    }

    #[tokio::test]
    async fn test_health_handler_degraded() {
        let response = health_handler(State(unreachable_state())).await;
        assert_eq!(response.status, "degraded");
        assert!(!response.store_connected);
        assert_eq!(response.backend, "redis");
    }

    #[tokio::test]
    async fn test_stats_handler_reports_layers() {
        let state = memory_state();
        seed_sessions(&state).await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.sets, 4);
        assert_eq!(response.layer_counts["session"], 3);
        assert_eq!(response.layer_counts["reference"], 1);
        assert_eq!(response.layer_counts["computed"], 0);
        assert!(response.memory_bytes.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_stats_handler_store_down() {
        let response = stats_handler(State(unreachable_state())).await;
        assert_eq!(response.backend, "redis");
        assert!(response.memory_bytes.is_none());
        assert!(response.layer_counts.is_empty());
        assert_eq!(response.hits, 0);
    }

    #[tokio::test]
    async fn test_invalidate_computed_handler() {
        let state = memory_state();
        let keys = state.cache.keys().clone();
        let none = BTreeMap::new();
        for (metric, event) in [("pace", "Monaco"), ("pace", "Imola"), ("tyres", "Monaco")] {
            let key = keys.computed_metric(metric, 2024, event, &none).unwrap();
            state.cache.set(&key, &1, 600).await.unwrap();
        }

        let query = ComputedInvalidateQuery {
            year: Some(2024),
            event: Some("Monaco".to_string()),
            metric: None,
        };
        let response = invalidate_computed_handler(State(state.clone()), Query(query))
            .await
            .unwrap();
        assert_eq!(response.removed, 2);

        let response =
            invalidate_computed_handler(State(state), Query(ComputedInvalidateQuery::default()))
                .await
                .unwrap();
        assert_eq!(response.removed, 1);
    }

    #[tokio::test]
    async fn test_invalidate_api_responses_handler() {
        let state = memory_state();
        let keys = state.cache.keys().clone();
        for endpoint in ["/laps", "/laps/fastest"] {
            let key = keys.api_response(endpoint, &BTreeMap::new()).unwrap();
            state.cache.set(&key, &"body", 600).await.unwrap();
        }

        let query = ApiInvalidateQuery {
            endpoint: Some("/laps".to_string()),
        };
        let response = invalidate_api_responses_handler(State(state.clone()), Query(query))
            .await
            .unwrap();
        assert_eq!(response.removed, 1);

        let response =
            invalidate_api_responses_handler(State(state), Query(ApiInvalidateQuery::default()))
                .await
                .unwrap();
        assert_eq!(response.removed, 1);
    }

    #[tokio::test]
    async fn test_reset_stats_handler() {
        let state = memory_state();
        seed_sessions(&state).await;

        let response = reset_stats_handler(State(state)).await;
        assert_eq!(response.sets, 0);
        assert_eq!(response.hits, 0);
    }

    #[tokio::test]
    async fn test_clear_handler_pattern_and_all() {
        let state = memory_state();
        seed_sessions(&state).await;

        let query = ClearQuery {
            pattern: Some("f1:session:2024:Monaco:*".to_string()),
        };
        let response = clear_handler(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(response.removed, 2);

        let response = clear_handler(State(state), Query(ClearQuery::default()))
            .await
            .unwrap();
        assert_eq!(response.removed, 2);
    }

    #[tokio::test]
    async fn test_invalidate_layer_handler() {
        let state = memory_state();
        seed_sessions(&state).await;

        let response = invalidate_layer_handler(State(state.clone()), Path("session".to_string()))
            .await
            .unwrap();
        assert_eq!(response.removed, 3);

        let result = invalidate_layer_handler(State(state), Path("laps".to_string())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalidate_session_handler() {
        let state = memory_state();
        seed_sessions(&state).await;

        let query = SessionInvalidateQuery {
            session: Some("Q".to_string()),
        };
        let response = invalidate_session_handler(
            State(state.clone()),
            Path((2024, "Monaco".to_string())),
            Query(query),
        )
        .await
        .unwrap();
        assert_eq!(response.removed, 1);

        let response = invalidate_session_handler(
            State(state),
            Path((2024, "Monaco".to_string())),
            Query(SessionInvalidateQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.removed, 1);
    }

    #[tokio::test]
    async fn test_warm_handler_scoped() {
        let cache = CacheAside::new(
            Arc::new(MemoryStore::new(100)),
            KeyBuilder::new("f1").unwrap(),
            TtlPolicy::default(),
        );
        let source = SeedWarmSource::new(vec![
            SeedEntry {
                layer: Layer::Reference,
                segments: vec!["circuits".into()],
                value: json!(["Monaco", "Suzuka"]),
                ttl: None,
            },
            SeedEntry {
                layer: Layer::Computed,
                segments: vec![2024i32.into(), "Monaco".into(), "pace".into()],
                value: json!({"VER": 74.2}),
                ttl: Some(60),
            },
        ]);
        let state = AppState::with_warm_source(cache, Arc::new(source));

        let body = Bytes::from_static(br#"{"layer": "reference"}"#);
        let report = warm_handler(State(state.clone()), body).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.populated, 1);

        let report = warm_handler(State(state.clone()), Bytes::new()).await.unwrap();
        assert_eq!(report.total, 2);

        let circuits = state.cache.keys().reference("circuits", None).unwrap();
        let cached: Option<Value> = state.cache.get(&circuits).await.unwrap();
        assert_eq!(cached, Some(json!(["Monaco", "Suzuka"])));
    }

    #[tokio::test]
    async fn test_warm_handler_rejects_bad_body() {
        let body = Bytes::from_static(br#"{"layer": "weather"}"#);
        let result = warm_handler(State(memory_state()), body).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_from_config_builds_cache() {
        let config = Config {
            cache_enabled: false,
            ..Config::default()
        };
        let state = AppState::from_config(&config, Arc::new(MemoryStore::new(10))).unwrap();
        assert!(!state.cache.is_enabled());
        assert_eq!(state.cache.keys().namespace(), "f1");
    }

    #[test]
    fn test_from_config_rejects_bad_namespace() {
        let config = Config {
            key_namespace: "f1:prod".to_string(),
            ..Config::default()
        };
        assert!(AppState::from_config(&config, Arc::new(MemoryStore::new(10))).is_err());
    }
}
