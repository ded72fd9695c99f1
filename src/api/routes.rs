use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::LatencyStats;
use crate::connections::Connections;
use crate::error::AppError;
use crate::lookup::{get_token_pools, latest_cached, recent_records};
use crate::types::{CacheEntry, Pool, RecencyField, TokenPoolRecord};

const DEFAULT_RECENT_LIMIT: i64 = 10;
const MAX_RECENT_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub conns: Arc<Connections>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/sync", get(get_stats_sync))
        .route("/pools/latest", get(get_latest_pool))
        .route("/pools/recent", get(get_recent_pools))
        .route("/pools/:token", get(get_pool))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub sort_by: RecencyField,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default)]
    pub sort_by: RecencyField,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SyncStatsResponse {
    pub cycles_timed: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub records_stored: i64,
}

#[derive(Serialize)]
pub struct TokenPoolsResponse {
    pub token_address: String,
    pub pools: Vec<Pool>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TokenPoolsResponse {
    fn from_entry(token_address: String, entry: CacheEntry) -> Self {
        Self {
            token_address,
            pools: entry.pools,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

impl From<TokenPoolRecord> for TokenPoolsResponse {
    fn from(r: TokenPoolRecord) -> Self {
        Self {
            token_address: r.token_address,
            pools: r.pools,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_stats_sync(State(state): State<ApiState>) -> Result<Json<SyncStatsResponse>, AppError> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    let records_stored = state.conns.document_store()?.count().await?;
    Ok(Json(SyncStatsResponse {
        cycles_timed: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
        records_stored,
    }))
}

async fn get_pool(
    State(state): State<ApiState>,
    Path(token): Path<String>,
) -> Result<Json<TokenPoolsResponse>, AppError> {
    match get_token_pools(&state.conns, &token).await? {
        Some(entry) => Ok(Json(TokenPoolsResponse::from_entry(token, entry))),
        None => Err(AppError::NotFound(format!("no pools for token {token}"))),
    }
}

async fn get_latest_pool(
    State(state): State<ApiState>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<TokenPoolsResponse>, AppError> {
    match latest_cached(&state.conns, params.sort_by).await? {
        Some((token, entry)) => Ok(Json(TokenPoolsResponse::from_entry(token, entry))),
        None => Err(AppError::NotFound("no cached pool entries".to_string())),
    }
}

async fn get_recent_pools(
    State(state): State<ApiState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<TokenPoolsResponse>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(0, MAX_RECENT_LIMIT);
    let rows = recent_records(&state.conns, params.sort_by, limit).await?;
    Ok(Json(rows.into_iter().map(TokenPoolsResponse::from).collect()))
}
