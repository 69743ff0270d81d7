//! Redis Store Module
//!
//! External backend using a shared, self-reconnecting `ConnectionManager`.

use std::fmt;
use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{StatsCounters, Store};
use crate::error::{CacheError, Result};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// How long to wait for a connection before reporting the store unavailable
    pub connect_timeout: Duration,
    /// How long any single command may wait for its reply
    pub response_timeout: Duration,
    /// After a failed connect or a timed-out command, calls fail fast for this long
    pub retry_backoff: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

#[derive(Default)]
struct ConnectionState {
    manager: Option<ConnectionManager>,
    /// Calls are refused without touching the network until this instant
    retry_after: Option<Instant>,
}

/// Redis-backed store.
///
/// The connection is established on first use and shared by every request.
/// Only one caller at a time attempts to connect; the others, and every
/// caller during the backoff that follows a failure, get `StoreUnavailable`
/// immediately instead of queueing behind the attempt.
pub struct RedisStore {
    client: Client,
    state: StdMutex<ConnectionState>,
    connecting: Mutex<()>,
    counters: StatsCounters,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Validates the URL; does not connect.
    pub fn new(config: RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::InvalidRequest(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            state: StdMutex::new(ConnectionState::default()),
            connecting: Mutex::new(()),
            counters: StatsCounters::new(),
            config,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts the fail-fast window.
    fn mark_unavailable(&self) {
        self.lock_state().retry_after = Some(Instant::now() + self.config.retry_backoff);
    }

    /// The shared connection if one exists, or an error while backing off.
    fn current_connection(&self) -> Result<Option<ConnectionManager>> {
        let state = self.lock_state();
        if let Some(until) = state.retry_after {
            let now = Instant::now();
            if now < until {
                return Err(CacheError::StoreUnavailable(format!(
                    "Redis unreachable, next attempt in {}ms",
                    (until - now).as_millis()
                )));
            }
        }
        Ok(state.manager.clone())
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        if let Some(conn) = self.current_connection()? {
            return Ok(conn);
        }

        let _attempt = self.connecting.try_lock().map_err(|_| {
            CacheError::StoreUnavailable("Redis connection attempt in progress".to_string())
        })?;
        // Another caller may have finished connecting between the two checks
        if let Some(conn) = self.current_connection()? {
            return Ok(conn);
        }

        let connect = ConnectionManager::new(self.client.clone());
        let conn = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!("Redis connection failed: {}", e);
                self.mark_unavailable();
                return Err(CacheError::StoreUnavailable(format!(
                    "Failed to connect to Redis: {}",
                    e
                )));
            }
            Err(_) => {
                warn!(
                    "Redis connection timed out after {:?}",
                    self.config.connect_timeout
                );
                self.mark_unavailable();
                return Err(CacheError::StoreUnavailable(format!(
                    "Timed out connecting to Redis after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        info!("Connected to Redis at {}", self.config.url);
        let mut state = self.lock_state();
        state.manager = Some(conn.clone());
        state.retry_after = None;
        Ok(conn)
    }

    /// Awaits one command under the response timeout.
    async fn exec<T, F>(&self, command: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.config.response_timeout, command).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "Redis command timed out after {:?}",
                    self.config.response_timeout
                );
                self.mark_unavailable();
                Err(CacheError::StoreUnavailable(format!(
                    "Redis did not reply within {:?}",
                    self.config.response_timeout
                )))
            }
        }
    }

    /// Walks SCAN MATCH and hands each batch of keys to `visit`.
    async fn scan<F>(&self, pattern: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(Vec<String>) -> Option<Vec<String>> + Send,
    {
        let mut conn = self.connection().await?;
        let mut cursor = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .exec(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;

            if let Some(doomed) = visit(keys) {
                if !doomed.is_empty() {
                    let _: usize = self.exec(conn.del(&doomed)).await?;
                }
            }

            cursor = next;
            if cursor == 0 {
                return Ok(());
            }
        }
    }
}

/// Pulls `used_memory:<n>` out of an `INFO memory` reply.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl Store for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn counters(&self) -> &StatsCounters {
        &self.counters
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        self.exec(conn.get(key)).await
    }

    async fn set_raw(&self, key: &str, payload: String, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = self.exec(conn.set_ex(key, payload, ttl_seconds.max(1))).await?;
        self.counters.record_set();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: u64 = self.exec(conn.del(key)).await?;
        self.counters.record_deletes(deleted);
        Ok(deleted > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut removed = 0usize;
        self.scan(pattern, |keys| {
            removed += keys.len();
            Some(keys)
        })
        .await?;
        self.counters.record_deletes(removed as u64);
        Ok(removed)
    }

    async fn count(&self, pattern: &str) -> Result<usize> {
        let mut total = 0usize;
        self.scan(pattern, |keys| {
            total += keys.len();
            None
        })
        .await?;
        Ok(total)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = self.exec(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    async fn memory_usage(&self) -> Result<Option<u64>> {
        let mut conn = self.connection().await?;
        let info: String = self
            .exec(redis::cmd("INFO").arg("memory").query_async(&mut conn))
            .await?;
        Ok(parse_used_memory(&info))
    }
}
