//! Expiring key-value cache in front of the document store.
//!
//! Two backends implement [`ExpiringStore`]: Redis for deployments and an
//! in-process map (`memory://`) for single-binary runs and tests.

pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};

pub use memory::MemoryCache;
pub use redis_store::RedisCache;

const PROBE_KEY: &str = "test";
const PROBE_VALUE: &str = "ok";
const PROBE_TTL: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Execute every staged write in one round trip and report how many landed.
    async fn write_batch(&self, batch: CacheBatch) -> Result<BatchReport>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn has_key_with_prefix(&self, prefix: &str) -> Result<bool>;

    async fn close(&self) -> Result<()>;

    /// Liveness probe: write a short-lived key and read it back.
    async fn probe(&self) -> Result<()> {
        self.set_ex(PROBE_KEY, PROBE_VALUE, PROBE_TTL).await?;
        match self.get(PROBE_KEY).await? {
            Some(v) if v == PROBE_VALUE => Ok(()),
            other => Err(AppError::connection("cache", format!("probe read back {other:?}"))),
        }
    }
}

/// Writes staged during a sync cycle or bootstrap, all sharing one TTL.
#[derive(Debug, Clone)]
pub struct CacheBatch {
    ttl: Duration,
    entries: Vec<(String, String)>,
}

impl CacheBatch {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Vec::new() }
    }

    pub fn stage(&mut self, key: String, value: String) {
        self.entries.push((key, value));
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Open the cache backend named by `url` (`redis://`, `rediss://`, `memory://`).
pub async fn open_cache(url: &str) -> Result<Arc<dyn ExpiringStore>> {
    if url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("redis+unix://") {
        Ok(Arc::new(RedisCache::connect(url).await?))
    } else if url.starts_with("memory://") {
        Ok(Arc::new(MemoryCache::new()))
    } else {
        Err(AppError::connection("cache", format!("unsupported cache URL scheme: {url}")))
    }
}
