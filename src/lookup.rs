//! Read side: cached lookups with document-store fallback, plus recency queries.

use tracing::{info, warn};

use crate::config::{cache_key, CACHE_KEY_PREFIX, REFILL_CACHE_TTL};
use crate::connections::Connections;
use crate::error::Result;
use crate::types::{CacheEntry, RecencyField, TokenPoolRecord};

/// Pools for one token. Cache first; on a miss (or an undecodable entry) the
/// durable record is returned and written back with a one-hour expiry.
pub async fn get_token_pools(conns: &Connections, token_address: &str) -> Result<Option<CacheEntry>> {
    let cache = conns.cache()?;
    let key = cache_key(token_address);

    if let Some(raw) = cache.get(&key).await? {
        match CacheEntry::decode(&raw) {
            Ok(entry) => {
                info!(token = %token_address, "Served pools from cache");
                return Ok(Some(entry));
            }
            Err(e) => warn!(key = %key, "Cached entry is not valid JSON, falling back to the document store: {e}"),
        }
    }

    let docs = conns.document_store()?;
    let Some(record) = docs.find(token_address).await? else {
        return Ok(None);
    };

    let entry = CacheEntry::from(&record);
    match entry.encode() {
        Ok(raw) => {
            if let Err(e) = cache.set_ex(&key, &raw, REFILL_CACHE_TTL).await {
                warn!(key = %key, "Cache refill failed: {e}");
            }
        }
        Err(e) => warn!(key = %key, "Could not encode cache refill: {e}"),
    }
    info!(token = %token_address, "Served pools from document store");
    Ok(Some(entry))
}

/// The cached entry with the greatest `created_at` / `updated_at`, with its token address.
/// Malformed entries are skipped. Ties keep the first key scanned.
pub async fn latest_cached(conns: &Connections, sort_by: RecencyField) -> Result<Option<(String, CacheEntry)>> {
    let cache = conns.cache()?;
    let keys = cache.keys_with_prefix(CACHE_KEY_PREFIX).await?;
    if keys.is_empty() {
        info!("No pool entries in cache");
        return Ok(None);
    }

    let mut latest: Option<(String, CacheEntry)> = None;
    for key in keys {
        // Expired between the scan and the read.
        let Some(raw) = cache.get(&key).await? else {
            continue;
        };
        let entry = match CacheEntry::decode(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, "Skipping malformed cache entry: {e}");
                continue;
            }
        };

        let newer = latest
            .as_ref()
            .map_or(true, |(_, best)| entry.timestamp(sort_by) > best.timestamp(sort_by));
        if newer {
            let token = key.strip_prefix(CACHE_KEY_PREFIX).unwrap_or(&key).to_string();
            latest = Some((token, entry));
        }
    }

    if let Some((token, _)) = &latest {
        info!(token = %token, "Latest cached entry by {sort_by}");
    }
    Ok(latest)
}

/// Most recent durable records, newest first.
pub async fn recent_records(conns: &Connections, sort_by: RecencyField, limit: i64) -> Result<Vec<TokenPoolRecord>> {
    let rows = conns.document_store()?.recent(sort_by, limit.max(0)).await?;
    info!(count = rows.len(), "Fetched {} most recent records by {sort_by}", rows.len());
    Ok(rows)
}
