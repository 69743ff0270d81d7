//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::cache::Layer;
use crate::error::CacheError;

/// Request body for POST /v1/cache/warm
///
/// An absent body or `layer` warms every seeded entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarmRequest {
    /// Restrict warming to one layer
    #[serde(default)]
    pub layer: Option<Layer>,
}

/// Query string for DELETE /v1/cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearQuery {
    /// Raw glob; defaults to the whole namespace
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ClearQuery {
    /// Returns the glob to delete, or `None` for "everything".
    ///
    /// Rejects blank patterns so an empty `?pattern=` never means "all".
    pub fn validated_pattern(&self) -> Result<Option<&str>, CacheError> {
        match self.pattern.as_deref() {
            None => Ok(None),
            Some(p) if p.trim().is_empty() => Err(CacheError::InvalidRequest(
                "Pattern cannot be empty".to_string(),
            )),
            Some(p) => Ok(Some(p)),
        }
    }
}

/// Query string for POST /v1/cache/sessions/:year/:event/invalidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInvalidateQuery {
    /// Session code (e.g. "Q", "R"); absent means the whole event
    #[serde(default)]
    pub session: Option<String>,
}

/// Query string for POST /v1/cache/computed/invalidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputedInvalidateQuery {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub event: Option<String>,
    /// Metric type (e.g. "pace", "driver-comparison")
    #[serde(default)]
    pub metric: Option<String>,
}

/// Query string for POST /v1/cache/api-responses/invalidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiInvalidateQuery {
    /// Endpoint path; absent means every cached response
    #[serde(default)]
    pub endpoint: Option<String>,
}
