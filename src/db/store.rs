use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::warn;

use crate::db::models::TokenPoolRow;
use crate::error::Result;
use crate::types::{Pool, RecencyField, TokenPoolRecord};

/// Durable collection of [`TokenPoolRecord`]s keyed by token address.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Trivial round trip used as the liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Create the collection and its recency indexes if missing.
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert or update one record. `created_at` is set only on insert and
    /// `updated_at` never moves backwards. Returns the record as stored.
    async fn upsert(&self, token_address: &str, pools: &[Pool], now_ms: i64) -> Result<TokenPoolRecord>;

    async fn find(&self, token_address: &str) -> Result<Option<TokenPoolRecord>>;

    /// Every record. Rows whose pools fail to decode are skipped.
    async fn all(&self) -> Result<Vec<TokenPoolRecord>>;

    /// Most recent records first, by `created_at` or `updated_at`.
    async fn recent(&self, order_by: RecencyField, limit: i64) -> Result<Vec<TokenPoolRecord>>;

    async fn count(&self) -> Result<i64>;

    async fn close(&self);
}

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open a pool for `sqlite:<path>` or `sqlite::memory:`. The database file is created if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database lives and dies with its connection; keep exactly one.
        let pool = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, token_address: &str, pools: &[Pool], now_ms: i64) -> Result<TokenPoolRecord> {
        let pools_json = serde_json::to_string(pools)?;

        let row = sqlx::query_as::<_, TokenPoolRow>(
            r#"
            INSERT INTO token_pools (token_address, pools, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(token_address) DO UPDATE SET
                pools = excluded.pools,
                updated_at = MAX(excluded.updated_at, token_pools.updated_at)
            RETURNING token_address, pools, created_at, updated_at
            "#,
        )
        .bind(token_address)
        .bind(&pools_json)
        .bind(now_ms)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;

        row.into_record()
    }

    async fn find(&self, token_address: &str) -> Result<Option<TokenPoolRecord>> {
        let row = sqlx::query_as::<_, TokenPoolRow>(
            r#"
            SELECT token_address, pools, created_at, updated_at
            FROM token_pools
            WHERE token_address = ?
            "#,
        )
        .bind(token_address)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenPoolRow::into_record).transpose()
    }

    async fn all(&self) -> Result<Vec<TokenPoolRecord>> {
        let rows = sqlx::query_as::<_, TokenPoolRow>(
            "SELECT token_address, pools, created_at, updated_at FROM token_pools",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn recent(&self, order_by: RecencyField, limit: i64) -> Result<Vec<TokenPoolRecord>> {
        let sql = format!(
            "SELECT token_address, pools, created_at, updated_at FROM token_pools ORDER BY {} DESC LIMIT ?",
            order_by.column()
        );
        let rows = sqlx::query_as::<_, TokenPoolRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_rows(rows))
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_pools")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_rows(rows: Vec<TokenPoolRow>) -> Vec<TokenPoolRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let token = row.token_address.clone();
            match row.into_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(token = %token, "Skipping stored record with undecodable pools: {e}");
                    None
                }
            }
        })
        .collect()
}
