use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// One liquidity venue as reported by the provider. Fields the pipeline does
/// not inspect are kept in `extra` so stored pools match what was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub dex_id: String,
    pub pair_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<Liquidity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liquidity {
    /// Kept as the provider's number so integers are not re-encoded as floats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pool {
    pub fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd.as_ref())
            .and_then(Number::as_f64)
    }

    /// Absent and empty label sets are the same thing.
    pub fn has_no_labels(&self) -> bool {
        self.labels.as_ref().map_or(true, |l| l.is_empty())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .as_ref()
            .map_or(false, |l| l.iter().any(|x| x == label))
    }
}

/// token address → pools, as fetched or as accepted by the filter.
pub type PoolListing = BTreeMap<String, Vec<Pool>>;

// ---------------------------------------------------------------------------
// Dex categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DexCategory {
    /// `pumpswap`, no labels
    Pumpswap,
    /// `raydium`, no labels (AMM v4)
    RaydiumV4,
    /// `meteora` labelled `DLMM`
    MeteoraDlmm,
    /// `orca` labelled `wp`
    OrcaWhirlpool,
}

impl DexCategory {
    /// The category a pool's shape matches, if any.
    pub fn of(pool: &Pool) -> Option<Self> {
        match pool.dex_id.as_str() {
            "pumpswap" if pool.has_no_labels() => Some(DexCategory::Pumpswap),
            "raydium" if pool.has_no_labels() => Some(DexCategory::RaydiumV4),
            "meteora" if pool.has_label("DLMM") => Some(DexCategory::MeteoraDlmm),
            "orca" if pool.has_label("wp") => Some(DexCategory::OrcaWhirlpool),
            _ => None,
        }
    }
}

impl std::fmt::Display for DexCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DexCategory::Pumpswap => "Pumpswap",
            DexCategory::RaydiumV4 => "RaydiumV4",
            DexCategory::MeteoraDlmm => "MeteoraDLMM",
            DexCategory::OrcaWhirlpool => "OrcaWp",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Stored shapes
// ---------------------------------------------------------------------------

/// Durable record for one token. `created_at` is written once; `updated_at` on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolRecord {
    pub token_address: String,
    pub pools: Vec<Pool>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Value stored under `pool:<tokenAddress>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub pools: Vec<Pool>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CacheEntry {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn timestamp(&self, field: RecencyField) -> i64 {
        match field {
            RecencyField::CreatedAt => self.created_at,
            RecencyField::UpdatedAt => self.updated_at,
        }
    }
}

impl From<&TokenPoolRecord> for CacheEntry {
    fn from(record: &TokenPoolRecord) -> Self {
        Self {
            pools: record.pools.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Which timestamp "most recent" is measured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl RecencyField {
    pub fn column(&self) -> &'static str {
        match self {
            RecencyField::CreatedAt => "created_at",
            RecencyField::UpdatedAt => "updated_at",
        }
    }
}

impl std::fmt::Display for RecencyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
