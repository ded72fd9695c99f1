use std::time::Duration;

use crate::error::{AppError, Result};

pub const PROVIDER_URL: &str = "http://127.0.0.1:5000/dex/json";
pub const DATABASE_URL: &str = "sqlite:dex_pools.db";
pub const CACHE_URL: &str = "redis://127.0.0.1:6379";

/// Pools at or below this USD liquidity are never persisted.
pub const LIQUIDITY_FLOOR_USD: f64 = 1000.0;

/// Maximum pools kept per token, in provider arrival order.
pub const MAX_POOLS_PER_TOKEN: usize = 100;

/// Token addresses longer than this (in characters) are truncated before any write.
pub const MAX_TOKEN_ADDRESS_LEN: usize = 100;

/// A token is persisted only when its surviving pools span at least this many categories.
pub const MIN_DISTINCT_CATEGORIES: usize = 2;

/// Namespace of every pool cache key: `pool:<tokenAddress>`.
pub const CACHE_KEY_PREFIX: &str = "pool:";

/// Expiry of cache entries written by a sync cycle or the startup bootstrap.
pub const SYNC_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Expiry of a cache entry refilled from the document store on a read miss.
pub const REFILL_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default sync interval (seconds).
pub const SYNC_INTERVAL_SECS: u64 = 120;

/// Provider request timeout (seconds).
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Default `process_delay` for mint entries created by the pool.toml export.
pub const DEFAULT_PROCESS_DELAY: i64 = 10_000;

pub fn cache_key(token_address: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{token_address}")
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider_url: String,
    pub database_url: String,
    pub cache_url: String,
    pub sync_interval_secs: u64,
    pub api_port: u16,
    pub log_level: String,
    /// Append-only diagnostic log (LOG_FILE)
    pub log_file: String,
    /// Routing config merged by the export binary (POOL_TOML_PATH)
    pub pool_toml_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sync_interval_secs = std::env::var("SYNC_INTERVAL_SECS")
            .unwrap_or_else(|_| SYNC_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("SYNC_INTERVAL_SECS must be a whole number of seconds".to_string()))?;
        if sync_interval_secs == 0 {
            return Err(AppError::Config("SYNC_INTERVAL_SECS must be greater than zero".to_string()));
        }

        Ok(Self {
            provider_url: std::env::var("PROVIDER_URL").unwrap_or_else(|_| PROVIDER_URL.to_string()),
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string()),
            cache_url: std::env::var("CACHE_URL").unwrap_or_else(|_| CACHE_URL.to_string()),
            sync_interval_secs,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_file: std::env::var("LOG_FILE").unwrap_or_else(|_| "pool_sync.log".to_string()),
            pool_toml_path: std::env::var("POOL_TOML_PATH").unwrap_or_else(|_| "pool.toml".to_string()),
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_uses_pool_namespace() {
        assert_eq!(cache_key("So11111111111111111111111111111111111111112"), "pool:So11111111111111111111111111111111111111112");
    }

    #[test]
    fn refill_ttl_is_shorter_than_sync_ttl() {
        assert_eq!(SYNC_CACHE_TTL.as_secs(), 86_400);
        assert_eq!(REFILL_CACHE_TTL.as_secs(), 3_600);
    }
}
