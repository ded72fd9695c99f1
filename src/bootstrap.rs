use tracing::{info, warn};

use crate::cache::{BatchReport, CacheBatch, ExpiringStore};
use crate::config::{cache_key, SYNC_CACHE_TTL};
use crate::connections::Connections;
use crate::db::DocumentStore;
use crate::error::Result;
use crate::types::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The cache already held pool entries.
    Skipped,
    Loaded { records: usize, report: BatchReport },
}

/// Copy every durable record into the cache, but only when the cache has no pool entries.
/// Startup-only: the full-table read is unbounded.
pub async fn warm_cache_if_empty(conns: &Connections) -> Result<BootstrapOutcome> {
    if !conns.is_cache_empty().await? {
        info!("Cache already holds pool entries, skipping bootstrap load");
        return Ok(BootstrapOutcome::Skipped);
    }

    info!("Cache is empty, loading pool records from the document store");
    let docs = conns.document_store()?;
    let cache = conns.cache()?;
    load_all(docs.as_ref(), cache.as_ref()).await
}

/// Write one cache entry per durable record, in a single batch.
pub async fn load_all(docs: &dyn DocumentStore, cache: &dyn ExpiringStore) -> Result<BootstrapOutcome> {
    let records = docs.all().await?;
    let mut batch = CacheBatch::new(SYNC_CACHE_TTL);
    for record in &records {
        batch.stage(cache_key(&record.token_address), CacheEntry::from(record).encode()?);
    }

    let report = cache.write_batch(batch).await?;
    if report.is_complete() {
        info!(records = records.len(), applied = report.applied, "Bootstrap loaded {} records into the cache", report.applied);
    } else {
        warn!(
            records = records.len(),
            applied = report.applied,
            failed = report.failed,
            "Bootstrap cache load incomplete: {} of {} keys failed",
            report.failed,
            records.len(),
        );
    }

    Ok(BootstrapOutcome::Loaded { records: records.len(), report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::RejectingCache;
    use crate::connections::tests::memory_connections;
    use crate::db::store::tests::memory_store;
    use crate::types::fixtures::pool;
    use std::time::Duration;

    #[tokio::test]
    async fn loads_one_entry_per_record_when_empty() {
        let conns = memory_connections().await;
        let docs = conns.document_store().unwrap();
        docs.upsert("tokenA", &[pool("orca", &["wp"], 5000.0, "O1")], 10).await.unwrap();
        docs.upsert("tokenB", &[pool("pumpswap", &[], 5000.0, "P1")], 20).await.unwrap();

        let outcome = warm_cache_if_empty(&conns).await.unwrap();
        assert_eq!(
            outcome,
            BootstrapOutcome::Loaded { records: 2, report: BatchReport { applied: 2, failed: 0 } }
        );

        let cache = conns.cache().unwrap();
        let raw = cache.get("pool:tokenB").await.unwrap().unwrap();
        let entry = CacheEntry::decode(&raw).unwrap();
        assert_eq!(entry.created_at, 20);
        assert_eq!(entry.pools[0].pair_address, "P1");
    }

    #[tokio::test]
    async fn existing_pool_key_makes_bootstrap_a_no_op() {
        let conns = memory_connections().await;
        conns.document_store().unwrap().upsert("tokenA", &[], 10).await.unwrap();
        let cache = conns.cache().unwrap();
        cache.set_ex("pool:other", "{}", Duration::from_secs(60)).await.unwrap();

        assert_eq!(warm_cache_if_empty(&conns).await.unwrap(), BootstrapOutcome::Skipped);
        assert!(cache.get("pool:tokenA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_store_loads_nothing() {
        let conns = memory_connections().await;
        let outcome = warm_cache_if_empty(&conns).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Loaded { records: 0, report: BatchReport::default() });
    }

    #[tokio::test]
    async fn partially_rejected_load_reports_failed_keys() {
        let docs = memory_store().await;
        docs.upsert("tokenA", &[], 1).await.unwrap();
        docs.upsert("tokenB", &[], 2).await.unwrap();
        docs.upsert("tokenC", &[], 3).await.unwrap();
        let cache = RejectingCache::rejecting(&["pool:tokenB"]);

        let outcome = load_all(&docs, &cache).await.unwrap();
        assert_eq!(
            outcome,
            BootstrapOutcome::Loaded { records: 3, report: BatchReport { applied: 2, failed: 1 } }
        );
        assert!(cache.get("pool:tokenA").await.unwrap().is_some());
        assert!(cache.get("pool:tokenB").await.unwrap().is_none());
    }
}
