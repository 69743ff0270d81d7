//! Cache Warming Module
//!
//! Runs a batch of `get_or_fetch` calls ahead of traffic.

use std::fmt;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::aside::Lookup;
use crate::cache::{CacheAside, CacheKey};

type WarmFetch = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// One key to populate and how to produce its value.
pub struct WarmTask {
    pub name: String,
    pub key: CacheKey,
    pub ttl_seconds: u64,
    fetch: WarmFetch,
}

impl WarmTask {
    pub fn new<F>(name: impl Into<String>, key: CacheKey, ttl_seconds: u64, fetch: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            key,
            ttl_seconds,
            fetch: Box::new(fetch),
        }
    }
}

impl fmt::Debug for WarmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmTask")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Outcome of a warm batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmReport {
    pub total: usize,
    /// Tasks whose value is now in the store (cached already or freshly written)
    pub populated: usize,
    /// Tasks that fetched a value the store did not accept
    pub uncached: usize,
    /// Tasks whose fetch failed
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CacheAside {
    /// Runs every task concurrently through `get_or_fetch`.
    pub async fn warm(&self, tasks: Vec<WarmTask>) -> WarmReport {
        let started = Instant::now();
        let total = tasks.len();

        let outcomes = join_all(tasks.into_iter().map(|task| async move {
            let WarmTask {
                name,
                key,
                ttl_seconds,
                fetch,
            } = task;
            info!("Warming cache: {}", name);
            self.load::<Value, _, _, _>(&key, ttl_seconds, fetch)
                .await
                .map(|(_, lookup)| lookup)
                .map_err(|e| format!("Error warming {}: {}", name, e))
        }))
        .await;

        let mut report = WarmReport {
            total,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(Lookup::Hit | Lookup::Stored) => report.populated += 1,
                Ok(Lookup::Uncached) => report.uncached += 1,
                Err(message) => {
                    warn!("{}", message);
                    report.failed += 1;
                    report.errors.push(message);
                }
            }
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Cache warming complete: {}/{} populated, {} not stored, in {}ms",
            report.populated, report.total, report.uncached, report.duration_ms
        );
        report
    }
}
