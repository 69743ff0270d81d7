//! Cache Entry Module
//!
//! A serialized payload plus its expiry metadata.

use chrono::{DateTime, Duration, Utc};

// == Cache Entry ==
/// Stored payload with creation time and TTL.
///
/// Invariant: `expires_at == created_at + ttl_seconds`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// JSON-encoded value
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(payload: String, ttl_seconds: u64, now: DateTime<Utc>) -> Self {
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = now
            .checked_add_signed(Duration::seconds(ttl.min(i64::MAX / 1_000)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            payload,
            created_at: now,
            ttl_seconds,
            expires_at,
        }
    }

    // == Is Expired ==
    /// An entry is logically absent once `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before expiry, zero once expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    /// Approximate footprint of key plus payload.
    pub fn size_bytes(&self, key: &str) -> usize {
        key.len() + self.payload.len()
    }
}
