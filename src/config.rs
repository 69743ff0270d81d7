//! Configuration Module
//!
//! Handles loading and managing cache service configuration from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::CacheError;

/// Which backing store the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-process map, lost on restart
    #[default]
    Memory,
    /// External Redis server
    Redis,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown store backend: {}. Valid backends: memory, redis",
                other
            ))),
        }
    }
}

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store implementation
    pub backend: StoreBackend,
    /// Redis connection URL (used when `backend` is Redis)
    pub redis_url: String,
    /// Seconds to wait when establishing the Redis connection
    pub redis_connect_timeout: u64,
    /// Seconds any single Redis command may wait for its reply
    pub redis_response_timeout: u64,
    /// First segment of every cache key
    pub key_namespace: String,
    /// Static TTL in seconds for non-reference layers without an event time
    pub default_ttl: u64,
    /// Upper bound in seconds applied to every TTL written
    pub max_ttl: u64,
    /// Global switch; when false every lookup goes straight to the fetch path
    pub cache_enabled: bool,
    /// Capacity of the in-process store
    pub max_entries: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Expiry sweep interval in seconds (memory backend only)
    pub cleanup_interval: u64,
    /// Optional JSON seed file for cache warming
    pub warm_seed_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STORE_BACKEND` - `memory` or `redis` (default: memory)
    /// - `REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    /// - `REDIS_CONNECT_TIMEOUT` - Connect timeout in seconds (default: 5)
    /// - `REDIS_RESPONSE_TIMEOUT` - Per-command timeout in seconds (default: 5)
    /// - `KEY_NAMESPACE` - Key namespace (default: f1)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `MAX_TTL` - Maximum TTL in seconds (default: 604800)
    /// - `CACHE_ENABLED` - Enable caching (default: true)
    /// - `MAX_ENTRIES` - In-process capacity (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `WARM_SEED_PATH` - Warm seed file (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: env::var("STORE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_connect_timeout: parse_var("REDIS_CONNECT_TIMEOUT")
                .unwrap_or(defaults.redis_connect_timeout),
            redis_response_timeout: parse_var("REDIS_RESPONSE_TIMEOUT")
                .unwrap_or(defaults.redis_response_timeout),
            key_namespace: env::var("KEY_NAMESPACE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.key_namespace),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            max_ttl: parse_var("MAX_TTL").unwrap_or(defaults.max_ttl),
            cache_enabled: env::var("CACHE_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.cache_enabled),
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            warm_seed_path: env::var("WARM_SEED_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_connect_timeout: 5,
            redis_response_timeout: 5,
            key_namespace: "f1".to_string(),
            default_ttl: 3600,
            max_ttl: 604_800,
            cache_enabled: true,
            max_entries: 10_000,
            server_port: 3000,
            cleanup_interval: 60,
            warm_seed_path: None,
        }
    }
}
