//! Cache Module
//!
//! Tiered cache-aside layer: key construction, TTL policy, pluggable stores.

mod aside;
mod clock;
mod entry;
mod key;
mod memory;
mod redis;
mod stats;
mod store;
mod ttl;
mod warm;


// Re-export public types
pub use aside::CacheAside;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{CacheKey, KeyBuilder, KeyParts, KeyPattern, KeySegment, Layer, KEY_DELIMITER, WILDCARD};
pub use memory::MemoryStore;
pub use self::redis::{RedisStore, RedisStoreConfig};
pub use stats::{CacheStats, StatsCounters};
pub use store::{glob_match, Store, StoreExt};
pub use ttl::{
    TtlPolicy, TtlTier, TTL_COMPLETED, TTL_HISTORICAL, TTL_LIVE, TTL_RECENT, TTL_REFERENCE,
    TTL_UPCOMING,
};
pub use warm::{WarmReport, WarmTask};
