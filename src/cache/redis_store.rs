use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;

use crate::cache::{BatchReport, CacheBatch, ExpiringStore};
use crate::error::Result;

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 500;

/// Redis-backed cache. The connection manager reconnects on its own and is
/// cheap to clone per command.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Walk the keyspace with SCAN. `stop_at_first` ends the walk on the first match.
    async fn scan_prefix(&self, prefix: &str, stop_at_first: bool) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            found.extend(keys);
            if next == 0 || (stop_at_first && !found.is_empty()) {
                break;
            }
            cursor = next;
        }

        Ok(found)
    }
}

#[async_trait]
impl ExpiringStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn write_batch(&self, batch: CacheBatch) -> Result<BatchReport> {
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut conn = self.conn.clone();
        let ttl = batch.ttl().as_secs();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in batch.entries() {
            pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl);
        }

        let total = batch.len();
        match pipe.query_async::<_, Vec<redis::Value>>(&mut conn).await {
            Ok(replies) => {
                let applied = replies.iter().filter(|r| matches!(r, redis::Value::Okay)).count();
                Ok(BatchReport { applied, failed: total - applied })
            }
            Err(e) => {
                warn!(keys = total, "Cache batch rejected: {e}");
                Ok(BatchReport { applied: 0, failed: total })
            }
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.scan_prefix(prefix, false).await
    }

    async fn has_key_with_prefix(&self, prefix: &str) -> Result<bool> {
        Ok(!self.scan_prefix(prefix, true).await?.is_empty())
    }

    async fn close(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("QUIT").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
