//! Cache Warm Sources
//!
//! Decides what gets warmed. A `WarmSource` turns a scope into `WarmTask`s;
//! `CacheAside::warm` runs them.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::cache::{CacheAside, KeySegment, Layer, WarmReport, WarmTask};
use crate::error::Result;

/// Produces the warm batch for an optional layer scope.
pub trait WarmSource: Send + Sync + fmt::Debug {
    fn tasks(&self, cache: &CacheAside, scope: Option<Layer>) -> Result<Vec<WarmTask>>;
}

/// One pre-computed value in a seed file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedEntry {
    pub layer: Layer,
    pub segments: Vec<KeySegment>,
    pub value: Value,
    /// Falls back to the layer's default TTL
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Warm source backed by a JSON array of `SeedEntry`.
///
/// ```json
/// [{"layer": "reference", "segments": ["teams"], "value": ["RBR", "FER"]}]
/// ```
#[derive(Debug, Clone, Default)]
pub struct SeedWarmSource {
    entries: Vec<SeedEntry>,
}

impl SeedWarmSource {
    pub fn new(entries: Vec<SeedEntry>) -> Self {
        Self { entries }
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read warm seed file {}", path.display()))?;
        let entries: Vec<SeedEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid warm seed file {}", path.display()))?;

        info!("Loaded {} warm seed entries from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WarmSource for SeedWarmSource {
    fn tasks(&self, cache: &CacheAside, scope: Option<Layer>) -> Result<Vec<WarmTask>> {
        self.entries
            .iter()
            .filter(|entry| scope.map_or(true, |layer| entry.layer == layer))
            .map(|entry| -> Result<WarmTask> {
                let key = cache.keys().build(entry.layer, &entry.segments)?;
                let ttl = entry
                    .ttl
                    .unwrap_or_else(|| cache.policy().default_for(entry.layer));
                let value = entry.value.clone();
                Ok(WarmTask::new(key.to_string(), key, ttl, move || {
                    async move { Ok(value) }.boxed()
                }))
            })
            .collect()
    }
}

/// Warms everything `source` offers. Run once before serving traffic.
pub async fn run_startup_warm(cache: &CacheAside, source: &dyn WarmSource) -> Result<WarmReport> {
    let tasks = source.tasks(cache, None)?;
    if tasks.is_empty() {
        info!("No warm tasks configured, skipping startup warm");
        return Ok(WarmReport::default());
    }
    Ok(cache.warm(tasks).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyBuilder, MemoryStore, TtlPolicy, TTL_REFERENCE};
    use crate::error::CacheError;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    const SEED: &str = r#"[
        {"layer": "reference", "segments": ["teams"], "value": ["RBR", "FER", "MCL"]},
        {"layer": "session", "segments": [2024, "Monaco", "Q"], "value": {"pole": "LEC"}, "ttl": 120}
    ]"#;

    fn cache() -> CacheAside {
        CacheAside::new(
            Arc::new(MemoryStore::new(100)),
            KeyBuilder::new("f1").unwrap(),
            TtlPolicy::default(),
        )
    }

    fn seed() -> SeedWarmSource {
        SeedWarmSource::new(serde_json::from_str(SEED).unwrap())
    }

    #[test]
    fn test_seed_tasks_use_keys_and_ttls() {
        let cache = cache();
        let tasks = seed().tasks(&cache, None).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].key.as_str(), "f1:reference:teams");
        assert_eq!(tasks[0].ttl_seconds, TTL_REFERENCE);
        assert_eq!(tasks[1].key.as_str(), "f1:session:2024:Monaco:Q");
        assert_eq!(tasks[1].ttl_seconds, 120);
    }

    #[test]
    fn test_seed_scope_filters_layers() {
        let cache = cache();
        let tasks = seed().tasks(&cache, Some(Layer::Session)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].key.layer(), Layer::Session);

        assert!(seed().tasks(&cache, Some(Layer::Computed)).unwrap().is_empty());
    }

    #[test]
    fn test_seed_rejects_bad_segment() {
        let source = SeedWarmSource::new(vec![SeedEntry {
            layer: Layer::Reference,
            segments: vec![KeySegment::from("drivers:2024")],
            value: json!([]),
            ttl: None,
        }]);
        let result = source.tasks(&cache(), None);
        assert!(matches!(result, Err(CacheError::InvalidKeyComponent(_))));
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();

        let source = SeedWarmSource::from_path(file.path()).unwrap();
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_from_path_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();

        let err = SeedWarmSource::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid warm seed file"));
    }

    #[tokio::test]
    async fn test_startup_warm_populates_cache() {
        let cache = cache();
        let report = run_startup_warm(&cache, &seed()).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.populated, 2);

        let key = cache.keys().session_data(2024, "Monaco", "Q").unwrap();
        let cached: Option<Value> = cache.get(&key).await.unwrap();
        assert_eq!(cached, Some(json!({"pole": "LEC"})));
    }

    #[tokio::test]
    async fn test_startup_warm_with_empty_source() {
        let report = run_startup_warm(&cache(), &SeedWarmSource::default())
            .await
            .unwrap();
        assert_eq!(report.total, 0);
    }
}
