//! Cache-Aside Module
//!
//! Get-or-fetch-and-populate over any `Store`, with TTLs from `TtlPolicy`.
//!
//! Concurrent misses on the same key each run their own fetch; there is no
//! request coalescing, so a cold popular key can cause a burst of fetches.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheKey, CacheStats, Clock, KeyBuilder, KeyPattern, KeySegment, Layer, Store, StoreExt,
    SystemClock, TtlPolicy,
};
use crate::error::{CacheError, Result};

/// Shortest TTL ever written.
const MIN_TTL: u64 = 1;

/// Where a `load` found or left its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Served from the store
    Hit,
    /// Fetched and written to the store
    Stored,
    /// Fetched but not written (cache disabled or store write failed)
    Uncached,
}

// == Cache Aside ==
/// The cache component handed to request handlers.
#[derive(Debug, Clone)]
pub struct CacheAside {
    store: Arc<dyn Store>,
    keys: KeyBuilder,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    enabled: bool,
    max_ttl: u64,
}

impl CacheAside {
    // == Constructor ==
    pub fn new(store: Arc<dyn Store>, keys: KeyBuilder, policy: TtlPolicy) -> Self {
        Self {
            store,
            keys,
            policy,
            clock: Arc::new(SystemClock),
            enabled: true,
            max_ttl: u64::MAX,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When disabled every lookup fetches and nothing is written.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_ttl(mut self, max_ttl: u64) -> Self {
        self.max_ttl = max_ttl.max(MIN_TTL);
        self
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn clamp_ttl(&self, ttl_seconds: u64) -> u64 {
        ttl_seconds.clamp(MIN_TTL, self.max_ttl)
    }

    // == Get Or Fetch ==
    /// Returns the cached value for `key`, or runs `fetch` and caches its result.
    ///
    /// Store failures never reach the caller: a failed read falls through to
    /// `fetch`, a failed write is logged. Errors from `fetch` are returned as-is.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl_seconds: u64,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.load(key, ttl_seconds, fetch)
            .await
            .map(|(value, _)| value)
    }

    /// `get_or_fetch` that also reports where the value ended up.
    pub(crate) async fn load<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl_seconds: u64,
        fetch: F,
    ) -> std::result::Result<(T, Lookup), E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if !self.enabled {
            return Ok((fetch().await?, Lookup::Uncached));
        }

        match self.store.get::<T>(key.as_str()).await {
            Ok(Some(value)) => {
                debug!("Cache hit for key '{}'", key);
                return Ok((value, Lookup::Hit));
            }
            Ok(None) => info!("Cache miss for key '{}' - fetching fresh data", key),
            Err(CacheError::Serialization(e)) => {
                warn!("Discarding unreadable cache entry '{}': {}", key, e)
            }
            Err(e) => warn!("Cache read failed for key '{}', fetching directly: {}", key, e),
        }

        let value = fetch().await?;
        let lookup = if self.populate(key, &value, ttl_seconds).await {
            Lookup::Stored
        } else {
            Lookup::Uncached
        };
        Ok((value, lookup))
    }

    /// Like `get_or_fetch`, with the TTL chosen by the policy from the key's
    /// layer and the event start time.
    pub async fn get_or_fetch_for_event<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        event_time: Option<DateTime<Utc>>,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let ttl = self.ttl_for(key.layer(), event_time);
        self.get_or_fetch(key, ttl, fetch).await
    }

    /// Fetches unconditionally and overwrites whatever is cached.
    pub async fn refresh<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl_seconds: u64,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        info!("Force refresh: fetching fresh data for key '{}'", key);
        let value = fetch().await?;
        if self.enabled {
            self.populate(key, &value, ttl_seconds).await;
        }
        Ok(value)
    }

    /// TTL the policy assigns right now.
    pub fn ttl_for(&self, layer: Layer, event_time: Option<DateTime<Utc>>) -> u64 {
        self.policy.ttl_for(layer, event_time, self.clock.now())
    }

    /// Best-effort write; returns whether the value landed in the store.
    async fn populate<T>(&self, key: &CacheKey, value: &T, ttl_seconds: u64) -> bool
    where
        T: Serialize + Sync,
    {
        let ttl = self.clamp_ttl(ttl_seconds);
        match self.store.set(key.as_str(), value, ttl).await {
            Ok(()) => {
                debug!("Cached key '{}' with TTL {}s", key, ttl);
                true
            }
            Err(e) => {
                warn!("Could not cache key '{}': {}", key, e);
                false
            }
        }
    }

    // == Direct Access ==
    /// Writes `value` under `key`; unlike `get_or_fetch`, errors are returned.
    pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl_seconds: u64) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.store
            .set(key.as_str(), value, self.clamp_ttl(ttl_seconds))
            .await
    }

    pub async fn get<T>(&self, key: &CacheKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.store.get(key.as_str()).await
    }

    // == Invalidation ==
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.store.delete(key.as_str()).await
    }

    /// Removes every key matching a raw glob.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let removed = self.store.delete_pattern(pattern).await?;
        info!("Invalidated {} cache entries matching '{}'", removed, pattern);
        Ok(removed)
    }

    /// Removes the pattern's exact key and everything below it.
    pub async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        let exact = usize::from(self.store.delete(pattern.base()).await?);
        let below = self.store.delete_pattern(&pattern.glob()).await?;
        info!("Invalidated {} cache entries under '{}'", exact + below, pattern.base());
        Ok(exact + below)
    }

    pub async fn invalidate_layer(&self, layer: Layer) -> Result<usize> {
        let pattern = self.keys.layer_pattern(layer);
        let removed = self.store.delete_pattern(&pattern.glob()).await?;
        warn!("Invalidated entire {} layer: {} keys deleted", layer, removed);
        Ok(removed)
    }

    /// Drops a session's data, or the whole event when `session` is `None`.
    pub async fn invalidate_session(
        &self,
        year: i32,
        event: &str,
        session: Option<&str>,
    ) -> Result<usize> {
        let mut segments: Vec<KeySegment> = vec![year.into(), event.into()];
        if let Some(session) = session {
            segments.push(session.into());
        }
        let pattern = self.keys.pattern(Layer::Session, &segments)?;
        self.invalidate_matching(&pattern).await
    }

    /// Drops computed metrics, narrowed by any of metric, year and event.
    ///
    /// Omitted filters match anything; with none given the whole layer goes.
    pub async fn invalidate_computed(
        &self,
        year: Option<i32>,
        event: Option<&str>,
        metric: Option<&str>,
    ) -> Result<usize> {
        let slots: [Option<KeySegment>; 3] = [
            metric.map(KeySegment::from),
            year.map(KeySegment::from),
            event.map(KeySegment::from),
        ];
        let used = slots.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        let slots = &slots[..used];

        if slots.is_empty() {
            return self.invalidate_layer(Layer::Computed).await;
        }
        if slots.iter().all(Option::is_some) {
            let segments: Vec<KeySegment> = slots.iter().flatten().cloned().collect();
            let pattern = self.keys.pattern(Layer::Computed, &segments)?;
            return self.invalidate_matching(&pattern).await;
        }
        let glob = self.keys.sparse_glob(Layer::Computed, slots)?;
        self.invalidate_pattern(&glob).await
    }

    /// Drops cached responses of one endpoint, or all of them.
    pub async fn invalidate_api_responses(&self, endpoint: Option<&str>) -> Result<usize> {
        match endpoint {
            Some(endpoint) => {
                let pattern = self.keys.api_endpoint_pattern(endpoint)?;
                self.invalidate_matching(&pattern).await
            }
            None => self.invalidate_layer(Layer::ApiResponse).await,
        }
    }

    /// Removes every key in the namespace.
    pub async fn invalidate_all(&self) -> Result<usize> {
        self.invalidate_pattern(&self.keys.namespace_glob()).await
    }

    // == Introspection ==
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn reset_stats(&self) {
        self.store.reset_stats();
    }

    /// Live key count per layer.
    pub async fn layer_counts(&self) -> Result<Vec<(Layer, usize)>> {
        let mut counts = Vec::with_capacity(Layer::ALL.len());
        for layer in Layer::ALL {
            let count = self.store.count(&self.keys.layer_pattern(layer).glob()).await?;
            counts.push((layer, count));
        }
        Ok(counts)
    }
}
