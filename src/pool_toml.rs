//! Export cached pools into the router's `pool.toml`.
//!
//! Pool addresses are grouped per mint (the token address) into one list per
//! venue and merged into `[[routing.mint_config_list]]`. Existing entries gain
//! new addresses at the end of each list; unknown mints are appended with
//! defaults. Every other key in the document is left as it was.

use std::collections::BTreeMap;
use std::path::Path;

use toml::{Table, Value};
use tracing::{info, warn};

use crate::cache::ExpiringStore;
use crate::config::{CACHE_KEY_PREFIX, DEFAULT_PROCESS_DELAY};
use crate::error::Result;
use crate::types::{CacheEntry, Pool};

const PUMP_LIST: &str = "pump_pool_list";
const RAYDIUM_LIST: &str = "raydium_pool_list";
const RAYDIUM_CP_LIST: &str = "raydium_cp_pool_list";
const METEORA_LIST: &str = "meteora_dlmm_pool_list";
const WHIRLPOOL_LIST: &str = "whirlpool_pool_list";
const LOOKUP_TABLES: &str = "lookup_table_accounts";
const PROCESS_DELAY: &str = "process_delay";

/// Pool addresses of one mint, per venue list. Insertion order, no duplicates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MintPools {
    pub pump: Vec<String>,
    pub raydium: Vec<String>,
    pub meteora_dlmm: Vec<String>,
    pub whirlpool: Vec<String>,
}

impl MintPools {
    /// File `pool` under its venue list. False when the dexId has no list.
    fn add(&mut self, pool: &Pool) -> bool {
        let list = match pool.dex_id.to_lowercase().as_str() {
            "pumpswap" => &mut self.pump,
            "raydium" => &mut self.raydium,
            "meteora" => &mut self.meteora_dlmm,
            "orca" => &mut self.whirlpool,
            _ => return false,
        };
        if !list.contains(&pool.pair_address) {
            list.push(pool.pair_address.clone());
        }
        true
    }

    fn lists(&self) -> [(&'static str, &[String]); 4] {
        [
            (PUMP_LIST, self.pump.as_slice()),
            (RAYDIUM_LIST, self.raydium.as_slice()),
            (METEORA_LIST, self.meteora_dlmm.as_slice()),
            (WHIRLPOOL_LIST, self.whirlpool.as_slice()),
        ]
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub keys_scanned: usize,
    pub malformed_keys: usize,
    pub skipped_pools: usize,
    pub mints_added: usize,
    pub mints_merged: usize,
    /// False when there was nothing to export and the file was not touched.
    pub written: bool,
}

/// Group the pools of `(mint, entry)` pairs by mint and venue.
pub fn collect_mint_pools<I>(entries: I, report: &mut ExportReport) -> BTreeMap<String, MintPools>
where
    I: IntoIterator<Item = (String, CacheEntry)>,
{
    let mut mints: BTreeMap<String, MintPools> = BTreeMap::new();
    for (mint, entry) in entries {
        let lists = mints.entry(mint).or_default();
        for pool in &entry.pools {
            if pool.pair_address.is_empty() || pool.dex_id.is_empty() {
                warn!(dex = %pool.dex_id, pair = %pool.pair_address, "Pool without dexId or pairAddress, skipped");
                report.skipped_pools += 1;
                continue;
            }
            if !lists.add(pool) {
                warn!(dex = %pool.dex_id, pair = %pool.pair_address, "Unknown dexId, pool skipped");
                report.skipped_pools += 1;
            }
        }
    }
    mints
}

/// `{ routing = { mint_config_list = [] } }`
pub fn default_document() -> Table {
    let mut routing = Table::new();
    routing.insert("mint_config_list".to_string(), Value::Array(Vec::new()));
    let mut doc = Table::new();
    doc.insert("routing".to_string(), Value::Table(routing));
    doc
}

/// Parse the existing file, or start from [`default_document`] when it is missing or invalid.
pub async fn load_document(path: &Path) -> Table {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), "Could not read pool config, starting from defaults: {e}");
            return default_document();
        }
    };
    match toml::from_str::<Table>(&content) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), "Could not parse pool config, starting from defaults: {e}");
            default_document()
        }
    }
}

/// Merge `mints` into `doc["routing"]["mint_config_list"]`.
pub fn merge_mints(doc: &mut Table, mints: &BTreeMap<String, MintPools>, report: &mut ExportReport) {
    let routing = doc
        .entry("routing")
        .or_insert(Value::Table(Table::new()));
    if !routing.is_table() {
        warn!("`routing` is not a table, replacing it");
        *routing = Value::Table(Table::new());
    }
    let Some(routing) = routing.as_table_mut() else {
        return;
    };

    let list = routing
        .entry("mint_config_list")
        .or_insert(Value::Array(Vec::new()));
    if !list.is_array() {
        warn!("`routing.mint_config_list` is not an array, replacing it");
        *list = Value::Array(Vec::new());
    }
    let Some(list) = list.as_array_mut() else {
        return;
    };

    for (mint, pools) in mints {
        let existing = list
            .iter()
            .position(|v| v.get("mint").and_then(Value::as_str) == Some(mint.as_str()));

        match existing {
            Some(i) => {
                if let Some(entry) = list[i].as_table_mut() {
                    for (name, addresses) in pools.lists() {
                        union_into(entry, name, addresses);
                    }
                }
                report.mints_merged += 1;
            }
            None => {
                list.push(Value::Table(new_mint_entry(mint, pools)));
                report.mints_added += 1;
            }
        }
    }
}

fn union_into(entry: &mut Table, name: &str, addresses: &[String]) {
    let slot = entry
        .entry(name)
        .or_insert(Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Some(values) = slot.as_array_mut() {
        for address in addresses {
            if !values.iter().any(|v| v.as_str() == Some(address.as_str())) {
                values.push(Value::String(address.clone()));
            }
        }
    }
}

fn new_mint_entry(mint: &str, pools: &MintPools) -> Table {
    let strings = |xs: &[String]| Value::Array(xs.iter().cloned().map(Value::String).collect());

    let mut entry = Table::new();
    entry.insert("mint".to_string(), Value::String(mint.to_string()));
    entry.insert(PUMP_LIST.to_string(), strings(&pools.pump));
    entry.insert(RAYDIUM_LIST.to_string(), strings(&pools.raydium));
    entry.insert(RAYDIUM_CP_LIST.to_string(), Value::Array(Vec::new()));
    entry.insert(METEORA_LIST.to_string(), strings(&pools.meteora_dlmm));
    entry.insert(WHIRLPOOL_LIST.to_string(), strings(&pools.whirlpool));
    entry.insert(LOOKUP_TABLES.to_string(), Value::Array(Vec::new()));
    entry.insert(PROCESS_DELAY.to_string(), Value::Integer(DEFAULT_PROCESS_DELAY));
    entry
}

/// Read every `pool:*` entry from the cache and merge it into the TOML file at `path`.
pub async fn export_pool_toml(cache: &dyn ExpiringStore, path: &Path) -> Result<ExportReport> {
    let mut report = ExportReport::default();

    let keys = cache.keys_with_prefix(CACHE_KEY_PREFIX).await?;
    report.keys_scanned = keys.len();
    if keys.is_empty() {
        info!("No pool entries in cache, nothing to export");
        return Ok(report);
    }

    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(raw) = cache.get(&key).await? else {
            continue;
        };
        match CacheEntry::decode(&raw) {
            Ok(entry) => {
                let mint = key.strip_prefix(CACHE_KEY_PREFIX).unwrap_or(&key).to_string();
                entries.push((mint, entry));
            }
            Err(e) => {
                warn!(key = %key, "Skipping malformed cache entry: {e}");
                report.malformed_keys += 1;
            }
        }
    }

    let mints = collect_mint_pools(entries, &mut report);
    if mints.is_empty() {
        info!("No valid pool entries found, nothing to export");
        return Ok(report);
    }

    let mut doc = load_document(path).await;
    merge_mints(&mut doc, &mints, &mut report);

    let rendered = toml::to_string_pretty(&doc)?;
    tokio::fs::write(path, rendered).await?;
    report.written = true;

    info!(
        path = %path.display(),
        added = report.mints_added,
        merged = report.mints_merged,
        "Updated pool config with {} mints",
        mints.len(),
    );
    Ok(report)
}
