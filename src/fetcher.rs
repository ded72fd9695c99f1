use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PROVIDER_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::{Pool, PoolListing};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub tokens_seen: usize,
    pub pools_seen: usize,
    /// Tokens whose value was not a pool array.
    pub skipped_tokens: usize,
    /// Pool entries that did not decode (placeholder errors, missing dexId, ...).
    pub skipped_pools: usize,
}

pub fn provider_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
        .build()?)
}

/// Fetch the full pool listing from the provider. A single response is assumed complete.
pub async fn fetch_listing(client: &reqwest::Client, url: &str) -> Result<(PoolListing, IngestStats)> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body_short: String = body.chars().take(200).collect();
        return Err(AppError::Fetch(format!("provider returned {status}: {body_short}")));
    }

    let payload: Value = resp.json().await?;
    decode_payload(&payload)
}

/// Decode `{ "data": { tokenAddress: [pool, ...] } }` into typed pools.
/// A malformed token or pool is skipped; only a missing `data` object fails the pass.
pub fn decode_payload(payload: &Value) -> Result<(PoolListing, IngestStats)> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_object())
        .ok_or_else(|| AppError::Fetch("response has no `data` object".to_string()))?;

    let mut listing = PoolListing::new();
    let mut stats = IngestStats::default();

    for (token_address, pools) in data {
        stats.tokens_seen += 1;

        let Some(items) = pools.as_array() else {
            warn!(token = %token_address, "Skipping token: pool list is not an array");
            stats.skipped_tokens += 1;
            continue;
        };

        let mut decoded = Vec::with_capacity(items.len());
        for item in items {
            stats.pools_seen += 1;
            match serde_json::from_value::<Pool>(item.clone()) {
                Ok(pool) => decoded.push(pool),
                Err(e) => {
                    stats.skipped_pools += 1;
                    debug!(token = %token_address, "Skipping malformed pool entry: {e}");
                }
            }
        }
        listing.insert(token_address.clone(), decoded);
    }

    Ok((listing, stats))
}
