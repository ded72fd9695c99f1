//! Eligibility filter: which pools and tokens a sync cycle persists.
//!
//! A pool survives when its shape matches one of the four [`DexCategory`]
//! variants and its USD liquidity is strictly above the floor. Survivors are
//! capped in arrival order. A token is kept only when its survivors span at
//! least two categories; otherwise it is dropped for the cycle.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{LIQUIDITY_FLOOR_USD, MAX_POOLS_PER_TOKEN, MIN_DISTINCT_CATEGORIES};
use crate::types::{DexCategory, Pool, PoolListing};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterStats {
    pub tokens_seen: usize,
    pub pools_seen: usize,
    pub rejected_unknown_shape: usize,
    pub rejected_low_liquidity: usize,
    /// Candidates beyond the per-token cap.
    pub truncated_pools: usize,
    /// Tokens dropped because their survivors spanned fewer than two categories.
    pub rejected_single_category: usize,
    pub accepted_tokens: usize,
}

/// Apply the eligibility rules to every token of a listing.
pub fn filter_listing(listing: &PoolListing) -> (PoolListing, FilterStats) {
    let mut stats = FilterStats::default();
    let mut accepted = PoolListing::new();

    for (token_address, pools) in listing {
        stats.tokens_seen += 1;
        if let Some(kept) = filter_token_pools(token_address, pools, &mut stats) {
            stats.accepted_tokens += 1;
            accepted.insert(token_address.clone(), kept);
        }
    }

    (accepted, stats)
}

/// Surviving pools for one token, or `None` when the token fails the diversity rule.
pub fn filter_token_pools(token_address: &str, pools: &[Pool], stats: &mut FilterStats) -> Option<Vec<Pool>> {
    let mut kept: Vec<Pool> = Vec::new();
    let mut categories: BTreeSet<DexCategory> = BTreeSet::new();

    for pool in pools {
        stats.pools_seen += 1;

        let Some(category) = DexCategory::of(pool) else {
            stats.rejected_unknown_shape += 1;
            debug!(
                token = %token_address,
                dex_id = %pool.dex_id,
                pair = %pool.pair_address,
                labels = ?pool.labels,
                "Pool shape not eligible",
            );
            continue;
        };

        if !has_sufficient_liquidity(pool) {
            stats.rejected_low_liquidity += 1;
            debug!(
                token = %token_address,
                category = %category,
                pair = %pool.pair_address,
                usd = ?pool.liquidity_usd(),
                "Pool below liquidity floor",
            );
            continue;
        }

        if kept.len() >= MAX_POOLS_PER_TOKEN {
            stats.truncated_pools += 1;
            continue;
        }

        categories.insert(category);
        kept.push(pool.clone());
    }

    if kept.is_empty() || categories.len() < MIN_DISTINCT_CATEGORIES {
        stats.rejected_single_category += 1;
        return None;
    }

    Some(kept)
}

/// Absent liquidity counts as zero.
pub fn has_sufficient_liquidity(pool: &Pool) -> bool {
    pool.liquidity_usd().map_or(false, |usd| usd > LIQUIDITY_FLOOR_USD)
}
