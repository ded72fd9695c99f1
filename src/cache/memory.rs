use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::{BatchReport, CacheBatch, ExpiringStore};
use crate::error::Result;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    #[inline]
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process expiring map. Expired entries are invisible and purged lazily.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            MemoryEntry { value: value.to_string(), expires_at: Instant::now() + ttl },
        );
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.is_live(now));
    }
}

#[async_trait]
impl ExpiringStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        // Copy out before touching the map again: a held ref blocks remove_if on the same shard.
        let hit = self.entries.get(key).map(|e| e.value().clone());
        match hit {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value)),
            Some(_) => {
                self.entries.remove_if(key, |_, e| !e.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn write_batch(&self, batch: CacheBatch) -> Result<BatchReport> {
        for (key, value) in batch.entries() {
            self.insert(key, value, batch.ttl());
        }
        Ok(BatchReport { applied: batch.len(), failed: 0 })
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.purge_expired();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn has_key_with_prefix(&self, prefix: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .any(|e| e.key().starts_with(prefix) && e.is_live(now)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
