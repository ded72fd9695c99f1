/// Row shape of the `token_pools` table. `pools` holds the JSON-encoded pool array.
#[derive(Debug, sqlx::FromRow)]
pub struct TokenPoolRow {
    pub token_address: String,
    pub pools: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TokenPoolRow {
    pub fn into_record(self) -> crate::error::Result<crate::types::TokenPoolRecord> {
        Ok(crate::types::TokenPoolRecord {
            pools: serde_json::from_str(&self.pools)?,
            token_address: self.token_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
