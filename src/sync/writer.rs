use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::{BatchReport, CacheBatch, ExpiringStore};
use crate::config::{cache_key, MAX_POOLS_PER_TOKEN, MAX_TOKEN_ADDRESS_LEN, SYNC_CACHE_TTL};
use crate::db::DocumentStore;
use crate::error::Result;
use crate::types::{CacheEntry, Pool, PoolListing};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub records_written: usize,
    pub truncated_addresses: usize,
    pub truncated_pool_lists: usize,
    pub cache: BatchReport,
}

/// Writes a filtered listing to the document store and mirrors it into the cache.
///
/// Durable writes are one round trip per token and are not transactional across
/// tokens. Cache writes are staged and sent as one batch at the end of the pass.
pub struct SyncWriter {
    docs: Arc<dyn DocumentStore>,
    cache: Arc<dyn ExpiringStore>,
}

impl SyncWriter {
    pub fn new(docs: Arc<dyn DocumentStore>, cache: Arc<dyn ExpiringStore>) -> Self {
        Self { docs, cache }
    }

    pub async fn write(&self, listing: &PoolListing, now_ms: i64) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut batch = CacheBatch::new(SYNC_CACHE_TTL);

        for (token_address, pools) in listing {
            let (token_address, address_truncated) = truncate_address(token_address);
            if address_truncated {
                report.truncated_addresses += 1;
                warn!(
                    token = %token_address,
                    "Token address longer than {MAX_TOKEN_ADDRESS_LEN} characters, truncated",
                );
            }

            if pools.len() > MAX_POOLS_PER_TOKEN {
                report.truncated_pool_lists += 1;
                warn!(
                    token = %token_address,
                    pools = pools.len(),
                    "Too many pools, keeping the first {MAX_POOLS_PER_TOKEN}",
                );
            }
            let pools = truncate_pools(pools);

            info!(
                token = %token_address,
                token_len = token_address.chars().count(),
                pools = pools.len(),
                "Writing token pools",
            );

            let record = match self.docs.upsert(&token_address, pools, now_ms).await {
                Ok(r) => r,
                Err(e) => {
                    error!(token = %token_address, "Document store write failed, abandoning the rest of the cycle: {e}");
                    // Keep the cache in step with the records that did land.
                    if let Err(flush_err) = self.flush(batch).await {
                        error!("Cache flush after the failed write also failed: {flush_err}");
                    }
                    return Err(e);
                }
            };

            batch.stage(cache_key(&record.token_address), CacheEntry::from(&record).encode()?);
            report.records_written += 1;
        }

        report.cache = self.flush(batch).await?;
        Ok(report)
    }

    async fn flush(&self, batch: CacheBatch) -> Result<BatchReport> {
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }
        let staged = batch.len();
        let report = self.cache.write_batch(batch).await?;
        if report.is_complete() {
            info!(applied = report.applied, "Cache batch applied: {} keys", report.applied);
        } else {
            warn!(
                applied = report.applied,
                failed = report.failed,
                "Cache batch partially applied: {} of {staged} keys failed",
                report.failed,
            );
        }
        Ok(report)
    }
}

/// Cap a token address at [`MAX_TOKEN_ADDRESS_LEN`] characters.
pub fn truncate_address(token_address: &str) -> (String, bool) {
    match token_address.char_indices().nth(MAX_TOKEN_ADDRESS_LEN) {
        Some((cut, _)) => (token_address[..cut].to_string(), true),
        None => (token_address.to_string(), false),
    }
}

/// Cap a pool list at [`MAX_POOLS_PER_TOKEN`] entries, keeping arrival order.
pub fn truncate_pools(pools: &[Pool]) -> &[Pool] {
    &pools[..pools.len().min(MAX_POOLS_PER_TOKEN)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::RejectingCache;
    use crate::cache::MemoryCache;
    use crate::db::store::tests::memory_store;
    use crate::db::SqliteDocumentStore;
    use crate::error::AppError;
    use crate::types::fixtures::pool;
    use crate::types::{RecencyField, TokenPoolRecord};
    use async_trait::async_trait;

    fn listing(entries: Vec<(String, Vec<Pool>)>) -> PoolListing {
        entries.into_iter().collect()
    }

    fn two_venues(tag: &str) -> Vec<Pool> {
        vec![
            pool("pumpswap", &[], 5000.0, &format!("{tag}-P")),
            pool("raydium", &[], 2000.0, &format!("{tag}-R")),
        ]
    }

    async fn cached(cache: &MemoryCache, token: &str) -> Option<CacheEntry> {
        cache
            .get(&cache_key(token))
            .await
            .unwrap()
            .map(|raw| CacheEntry::decode(&raw).unwrap())
    }

    #[tokio::test]
    async fn repeated_sync_preserves_created_at_in_store_and_cache() {
        let docs = Arc::new(memory_store().await);
        let cache = Arc::new(MemoryCache::new());
        let writer = SyncWriter::new(docs.clone(), cache.clone());
        let input = listing(vec![("tokenA".to_string(), two_venues("a"))]);

        writer.write(&input, 1_000).await.unwrap();
        let report = writer.write(&input, 2_000).await.unwrap();
        assert_eq!(report.records_written, 1);
        assert_eq!(report.cache, BatchReport { applied: 1, failed: 0 });

        let record = docs.find("tokenA").await.unwrap().unwrap();
        assert_eq!((record.created_at, record.updated_at), (1_000, 2_000));

        let entry = cached(&cache, "tokenA").await.unwrap();
        assert_eq!((entry.created_at, entry.updated_at), (1_000, 2_000));
        assert_eq!(entry.pools, record.pools);
    }

    #[tokio::test]
    async fn oversized_address_and_pool_list_are_truncated_before_writing() {
        let docs = Arc::new(memory_store().await);
        let cache = Arc::new(MemoryCache::new());
        let writer = SyncWriter::new(docs.clone(), cache.clone());

        let long_token = "x".repeat(150);
        let pools: Vec<Pool> = (0..150).map(|i| pool("orca", &["wp"], 9000.0, &format!("O{i}"))).collect();
        let report = writer
            .write(&listing(vec![(long_token.clone(), pools)]), 5)
            .await
            .unwrap();

        assert_eq!(report.truncated_addresses, 1);
        assert_eq!(report.truncated_pool_lists, 1);

        let short_token = "x".repeat(100);
        assert!(docs.find(&long_token).await.unwrap().is_none());
        let record = docs.find(&short_token).await.unwrap().unwrap();
        assert_eq!(record.pools.len(), 100);
        assert_eq!(record.pools[99].pair_address, "O99");
        assert_eq!(cached(&cache, &short_token).await.unwrap().pools.len(), 100);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let token = "é".repeat(120);
        let (cut, truncated) = truncate_address(&token);
        assert!(truncated);
        assert_eq!(cut.chars().count(), 100);

        let (same, truncated) = truncate_address("short");
        assert_eq!((same.as_str(), truncated), ("short", false));
    }

    /// Document store that rejects one token and delegates everything else.
    struct RejectingStore {
        inner: SqliteDocumentStore,
        reject: &'static str,
    }

    #[async_trait]
    impl DocumentStore for RejectingStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn ensure_schema(&self) -> Result<()> {
            self.inner.ensure_schema().await
        }
        async fn upsert(&self, token_address: &str, pools: &[Pool], now_ms: i64) -> Result<TokenPoolRecord> {
            if token_address == self.reject {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.upsert(token_address, pools, now_ms).await
        }
        async fn find(&self, token_address: &str) -> Result<Option<TokenPoolRecord>> {
            self.inner.find(token_address).await
        }
        async fn all(&self) -> Result<Vec<TokenPoolRecord>> {
            self.inner.all().await
        }
        async fn recent(&self, order_by: RecencyField, limit: i64) -> Result<Vec<TokenPoolRecord>> {
            self.inner.recent(order_by, limit).await
        }
        async fn count(&self) -> Result<i64> {
            self.inner.count().await
        }
        async fn close(&self) {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn failed_write_abandons_the_rest_but_caches_what_landed() {
        let docs = Arc::new(RejectingStore { inner: memory_store().await, reject: "tokenB" });
        let cache = Arc::new(MemoryCache::new());
        let writer = SyncWriter::new(docs.clone(), cache.clone());
        let input = listing(vec![
            ("tokenA".to_string(), two_venues("a")),
            ("tokenB".to_string(), two_venues("b")),
            ("tokenC".to_string(), two_venues("c")),
        ]);

        let err = writer.write(&input, 10).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        assert!(docs.find("tokenA").await.unwrap().is_some());
        assert!(docs.find("tokenC").await.unwrap().is_none());
        assert!(cached(&cache, "tokenA").await.is_some());
        assert!(cached(&cache, "tokenC").await.is_none());
    }

    #[tokio::test]
    async fn partially_applied_cache_batch_is_reported() {
        let docs = Arc::new(memory_store().await);
        let cache = Arc::new(RejectingCache::rejecting(&["pool:tokenB"]));
        let writer = SyncWriter::new(docs.clone(), cache.clone());
        let input = listing(vec![
            ("tokenA".to_string(), two_venues("a")),
            ("tokenB".to_string(), two_venues("b")),
        ]);

        let report = writer.write(&input, 10).await.unwrap();
        assert_eq!(report.records_written, 2);
        assert_eq!(report.cache, BatchReport { applied: 1, failed: 1 });
        assert!(!report.cache.is_complete());
        assert!(docs.find("tokenB").await.unwrap().is_some());
        assert!(cache.get("pool:tokenB").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn durable_error_survives_a_failing_cache_flush() {
        let docs = Arc::new(RejectingStore { inner: memory_store().await, reject: "tokenB" });
        let cache = Arc::new(RejectingCache::refusing_batches());
        let writer = SyncWriter::new(docs.clone(), cache);
        let input = listing(vec![
            ("tokenA".to_string(), two_venues("a")),
            ("tokenB".to_string(), two_venues("b")),
        ]);

        let err = writer.write(&input, 10).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(docs.find("tokenA").await.unwrap().is_some());
    }
}
