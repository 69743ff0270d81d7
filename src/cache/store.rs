//! Cache Store Module
//!
//! Backend-agnostic key-value contract with TTL, pattern delete and counters.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{CacheStats, StatsCounters};
use crate::error::Result;

// == Store Trait ==
/// Key-value backend holding JSON text with per-key expiry.
///
/// Every method fails with `StoreUnavailable` when the backend cannot be
/// reached. Misses and expired entries are `Ok(None)`, not errors.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    /// Short backend name for logs and the stats surface.
    fn backend(&self) -> &'static str;

    /// Counters shared by all operations on this store.
    fn counters(&self) -> &StatsCounters;

    /// Reads the raw JSON payload. Does not touch the hit/miss counters.
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Writes unconditionally with expiry; counts a set.
    async fn set_raw(&self, key: &str, payload: String, ttl_seconds: u64) -> Result<()>;

    /// Removes `key` if present. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching the glob `pattern`. Returns the count removed.
    ///
    /// Weakly consistent: writes racing the scan may or may not be removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    /// Number of live keys matching the glob `pattern`.
    async fn count(&self, pattern: &str) -> Result<usize>;

    /// Round trip to the backend.
    async fn ping(&self) -> Result<()>;

    /// Approximate memory used, in bytes, when the backend can tell.
    async fn memory_usage(&self) -> Result<Option<u64>>;

    /// Snapshot of the cumulative counters.
    fn stats(&self) -> CacheStats {
        self.counters().snapshot()
    }

    fn reset_stats(&self) {
        self.counters().reset();
    }
}

// == Typed Extension ==
/// Typed get/set on top of the raw JSON contract.
#[async_trait]
pub trait StoreExt: Store {
    /// Reads and deserializes `key`, counting a hit or a miss.
    ///
    /// A payload of the wrong shape is a `Serialization` error and counts as a miss.
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let payload = match self.get_raw(key).await? {
            Some(payload) => payload,
            None => {
                self.counters().record_miss();
                return Ok(None);
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => {
                self.counters().record_hit();
                Ok(Some(value))
            }
            Err(e) => {
                self.counters().record_miss();
                Err(e.into())
            }
        }
    }

    /// Serializes and writes `value`. Unrepresentable values fail before reaching the backend.
    async fn set<T>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_string(value)?;
        self.set_raw(key, payload, ttl_seconds).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

// == Glob Matching ==
/// Redis-style glob: `*` any run, `?` any char, `\` escapes the next char.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                k += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == key[k] {
                    p += 2;
                    k += 1;
                    continue;
                }
            }
            Some(c) if c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                k = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
