//! In-Memory Store Module
//!
//! Process-local backend: HashMap storage with lazy TTL expiry and a capacity bound.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::store::glob_match;
use crate::cache::{CacheEntry, Clock, StatsCounters, Store, SystemClock};
use crate::error::Result;

// == Memory Store ==
/// Store backed by a map in this process.
///
/// When full, inserting a new key evicts the entry closest to expiry.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: StatsCounters,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: StatsCounters::new(),
            clock,
            max_entries: max_entries.max(1),
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn evict_one(&self, entries: &mut HashMap<String, CacheEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            entries.remove(&key);
            self.counters.record_eviction();
            debug!("Evicted '{}' to stay under {} entries", key, self.max_entries);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn counters(&self) -> &StatsCounters {
        &self.counters
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    return Ok(Some(entry.payload.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it unless a writer replaced it meanwhile
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_raw(&self, key: &str, payload: String, ttl_seconds: u64) -> Result<()> {
        let entry = CacheEntry::new(payload, ttl_seconds, self.clock.now());
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            self.evict_one(&mut entries);
        }

        entries.insert(key.to_string(), entry);
        self.counters.record_set();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.entries.write().await.remove(key).is_some();
        self.counters.record_deletes(u64::from(removed));
        Ok(removed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        // Expired matches are dropped but not counted, matching `count`
        let mut removed = 0usize;
        entries.retain(|key, entry| {
            if !glob_match(pattern, key) {
                return true;
            }
            if !entry.is_expired_at(now) {
                removed += 1;
            }
            false
        });
        self.counters.record_deletes(removed as u64);
        Ok(removed)
    }

    async fn count(&self, pattern: &str) -> Result<usize> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && glob_match(pattern, key))
            .count())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn memory_usage(&self) -> Result<Option<u64>> {
        let entries = self.entries.read().await;
        let bytes: usize = entries
            .iter()
            .map(|(key, entry)| entry.size_bytes(key))
            .sum();
        Ok(Some(bytes as u64))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, StoreExt};
    use crate::error::CacheError;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::collections::HashMap as StdMap;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (MemoryStore::with_clock(100, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let (store, _) = store_with_clock();
        let value = json!({"driver": "VER", "laps": [78.1, 77.9], "pole": true});

        store.set("f1:session:2024:Monaco:Q:laps", &value, 60).await.unwrap();
        let fetched: Option<serde_json::Value> =
            store.get("f1:session:2024:Monaco:Q:laps").await.unwrap();

        assert_eq!(fetched, Some(value));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_absent() {
        let (store, _) = store_with_clock();
        let fetched: Option<u32> = store.get("nope").await.unwrap();
        assert!(fetched.is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expiry_with_simulated_clock() {
        let (store, clock) = store_with_clock();
        store.set("k", &1u32, 10).await.unwrap();

        clock.advance(Duration::seconds(9));
        assert_eq!(store.get::<u32>("k").await.unwrap(), Some(1));

        clock.advance(Duration::seconds(1));
        assert_eq!(store.get::<u32>("k").await.unwrap(), None);
        assert!(store.is_empty().await, "expired entry is dropped on read");
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let (store, clock) = store_with_clock();
        store.set("k", &"old", 10).await.unwrap();
        clock.advance(Duration::seconds(8));
        store.set("k", &"new", 10).await.unwrap();
        clock.advance(Duration::seconds(8));

        assert_eq!(store.get::<String>("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _) = store_with_clock();
        store.set("k", &1u8, 60).await.unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.stats().deletes, 1);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let (store, _) = store_with_clock();
        store.set("f1:session:2024:Monaco:Q", &1, 60).await.unwrap();
        store.set("f1:session:2024:Monza:R", &2, 60).await.unwrap();
        store.set("f1:reference:teams", &3, 60).await.unwrap();

        let removed = store.delete_pattern("f1:session:*").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.get::<i32>("f1:reference:teams").await.unwrap(), Some(3));
        assert_eq!(store.stats().deletes, 2);
    }

    #[tokio::test]
    async fn test_delete_pattern_ignores_expired_matches() {
        let (store, clock) = store_with_clock();
        store.set("f1:session:2024:Monaco:Q", &1, 5).await.unwrap();
        store.set("f1:session:2024:Monaco:R", &2, 50).await.unwrap();
        clock.advance(Duration::seconds(6));

        assert_eq!(store.count("f1:session:*").await.unwrap(), 1);
        let removed = store.delete_pattern("f1:session:*").await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.stats().deletes, 1);
        assert!(store.is_empty().await, "expired match is still dropped");
    }

    #[tokio::test]
    async fn test_count_skips_expired() {
        let (store, clock) = store_with_clock();
        store.set("f1:computed:a", &1, 5).await.unwrap();
        store.set("f1:computed:b", &1, 50).await.unwrap();
        clock.advance(Duration::seconds(6));

        assert_eq!(store.count("f1:computed:*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let (store, _) = store_with_clock();
        store.set("k", &1, 60).await.unwrap();
        for _ in 0..3 {
            store.get::<i32>("k").await.unwrap();
        }
        store.get::<i32>("missing").await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hit_rate(), 0.75);

        store.reset_stats();
        assert_eq!(store.stats().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_unrepresentable_value_is_rejected() {
        let (store, _) = store_with_clock();
        let mut bad: StdMap<(u8, u8), u8> = StdMap::new();
        bad.insert((1, 2), 3);

        let result = store.set("k", &bad, 60).await;

        assert!(matches!(result, Err(CacheError::Serialization(_))));
        assert_eq!(store.stats().sets, 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_serialization_error() {
        let (store, _) = store_with_clock();
        store.set("k", &"text", 60).await.unwrap();
        let result = store.get::<u64>("k").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));

        let stats = store.stats();
        assert_eq!(stats.hits, 0, "unreadable payload is not a hit");
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_soonest_expiry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryStore::with_clock(2, clock);
        store.set("long", &1, 600).await.unwrap();
        store.set("short", &2, 10).await.unwrap();
        store.set("new", &3, 300).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.get::<i32>("short").await.unwrap().is_none());
        assert_eq!(store.get::<i32>("long").await.unwrap(), Some(1));
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (store, clock) = store_with_clock();
        store.set("a", &1, 1).await.unwrap();
        store.set("b", &2, 100).await.unwrap();
        clock.advance(Duration::seconds(2));

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_usage() {
        let (store, _) = store_with_clock();
        store.set("ab", &"xyz", 60).await.unwrap();
        // key (2) + payload "\"xyz\"" (5)
        assert_eq!(store.memory_usage().await.unwrap(), Some(7));
    }
}
