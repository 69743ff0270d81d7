//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheStats, Layer};

/// Response body for GET /v1/cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    /// hits / (hits + misses), 0.0 when nothing was read
    pub hit_rate: f64,
    /// Approximate bytes held by the store; absent when it cannot tell or is unreachable
    pub memory_bytes: Option<u64>,
    /// Live keys per layer; empty when the store could not be counted
    pub layer_counts: BTreeMap<String, usize>,
    pub backend: String,
    pub cache_enabled: bool,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a counter snapshot
    pub fn new(stats: CacheStats, backend: impl Into<String>, cache_enabled: bool) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            deletes: stats.deletes,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            memory_bytes: None,
            layer_counts: BTreeMap::new(),
            backend: backend.into(),
            cache_enabled,
        }
    }

    pub fn with_memory_bytes(mut self, memory_bytes: Option<u64>) -> Self {
        self.memory_bytes = memory_bytes;
        self
    }

    pub fn with_layer_counts(mut self, counts: Vec<(Layer, usize)>) -> Self {
        self.layer_counts = counts
            .into_iter()
            .map(|(layer, count)| (layer.to_string(), count))
            .collect();
        self
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the store answered, "degraded" otherwise
    pub status: String,
    pub store_connected: bool,
    /// Round trip of the store ping in milliseconds
    pub latency_ms: f64,
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a HealthResponse stamped with the current time
    pub fn new(store_connected: bool, latency_ms: f64, backend: impl Into<String>) -> Self {
        let status = if store_connected { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            store_connected,
            latency_ms,
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for every invalidation endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    /// Number of keys deleted
    pub removed: usize,
    pub message: String,
}

impl RemovedResponse {
    pub fn new(removed: usize, target: impl AsRef<str>) -> Self {
        Self {
            removed,
            message: format!("Removed {} keys matching '{}'", removed, target.as_ref()),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
