//! F1 Cache - TTL-tiered cache-aside layer for F1 data services
//!
//! Deterministic keys, freshness-based TTLs, and Redis or in-process storage
//! behind a small admin HTTP surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheAside, KeyBuilder, Layer, Store, TtlPolicy};
pub use config::{Config, StoreBackend};
pub use error::CacheError;
pub use tasks::spawn_cleanup_task;
