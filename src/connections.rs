//! Owns the document-store and cache handles for the lifetime of the process.
//!
//! Constructed once in `main` and shared by `Arc`; every component asks it for
//! a handle instead of holding a connection of its own.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::cache::{open_cache, ExpiringStore};
use crate::config::{Config, CACHE_KEY_PREFIX};
use crate::db::{DocumentStore, SqliteDocumentStore};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub database_url: String,
    pub cache_url: String,
}

impl From<&Config> for ConnectionSettings {
    fn from(cfg: &Config) -> Self {
        Self { database_url: cfg.database_url.clone(), cache_url: cfg.cache_url.clone() }
    }
}

#[derive(Clone)]
struct Handles {
    docs: Arc<dyn DocumentStore>,
    cache: Arc<dyn ExpiringStore>,
}

pub struct Connections {
    settings: ConnectionSettings,
    handles: Mutex<Option<Handles>>,
}

impl Connections {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings, handles: Mutex::new(None) }
    }

    /// Open and probe both backends. On any failure whatever was opened is closed again.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let docs = SqliteDocumentStore::connect(&self.settings.database_url)
            .await
            .map_err(|e| AppError::connection("document store", e))?;
        if let Err(e) = docs.ping().await {
            docs.close().await;
            return Err(AppError::connection("document store", e));
        }
        info!("Document store connected: {}", self.settings.database_url);

        let cache = match open_cache(&self.settings.cache_url).await {
            Ok(c) => c,
            Err(e) => {
                docs.close().await;
                return Err(as_connection_error("cache", e));
            }
        };
        if let Err(e) = cache.probe().await {
            close_quietly("cache", cache.as_ref()).await;
            docs.close().await;
            return Err(as_connection_error("cache", e));
        }
        info!("Cache connected: {}", self.settings.cache_url);

        let handles = Handles { docs: Arc::new(docs), cache };
        if let Ok(mut slot) = self.handles.lock() {
            *slot = Some(handles);
        }
        Ok(())
    }

    fn current(&self) -> Option<Handles> {
        self.handles.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn document_store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.current()
            .map(|h| h.docs)
            .ok_or(AppError::NotInitialized("document store"))
    }

    pub fn cache(&self) -> Result<Arc<dyn ExpiringStore>> {
        self.current()
            .map(|h| h.cache)
            .ok_or(AppError::NotInitialized("cache"))
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// True when no key under the `pool:` namespace exists.
    pub async fn is_cache_empty(&self) -> Result<bool> {
        let cache = self.cache()?;
        Ok(!cache.has_key_with_prefix(CACHE_KEY_PREFIX).await?)
    }

    /// Release both connections. Safe to call repeatedly; close errors are logged, never returned.
    pub async fn close(&self) {
        let taken = match self.handles.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(handles) = taken else {
            return;
        };

        handles.docs.close().await;
        info!("Document store connection closed");
        close_quietly("cache", handles.cache.as_ref()).await;
    }
}

async fn close_quietly(backend: &'static str, cache: &dyn ExpiringStore) {
    match cache.close().await {
        Ok(()) => info!("{backend} connection closed"),
        Err(e) => error!("Error closing {backend} connection: {e}"),
    }
}

fn as_connection_error(backend: &'static str, e: AppError) -> AppError {
    match e {
        AppError::Connection { .. } => e,
        other => AppError::connection(backend, other),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub async fn memory_connections() -> Arc<Connections> {
        let conns = Arc::new(Connections::new(ConnectionSettings {
            database_url: "sqlite::memory:".to_string(),
            cache_url: "memory://".to_string(),
        }));
        conns.initialize().await.unwrap();
        conns.document_store().unwrap().ensure_schema().await.unwrap();
        conns
    }

    #[tokio::test]
    async fn handles_are_unavailable_before_initialize() {
        let conns = Connections::new(ConnectionSettings {
            database_url: "sqlite::memory:".to_string(),
            cache_url: "memory://".to_string(),
        });
        assert!(matches!(conns.document_store(), Err(AppError::NotInitialized(_))));
        assert!(matches!(conns.cache(), Err(AppError::NotInitialized(_))));
        assert!(matches!(conns.is_cache_empty().await, Err(AppError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_revokes_handles() {
        let conns = memory_connections().await;
        assert!(conns.is_initialized());
        conns.close().await;
        conns.close().await;
        assert!(matches!(conns.cache(), Err(AppError::NotInitialized("cache"))));
        assert!(matches!(conns.document_store(), Err(AppError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn unsupported_cache_scheme_fails_initialize() {
        let conns = Connections::new(ConnectionSettings {
            database_url: "sqlite::memory:".to_string(),
            cache_url: "memcached://localhost".to_string(),
        });
        let err = conns.initialize().await.unwrap_err();
        assert!(matches!(err, AppError::Connection { backend: "cache", .. }));
        assert!(!conns.is_initialized());
    }

    #[tokio::test]
    async fn probe_key_does_not_count_as_pool_data() {
        let conns = memory_connections().await;
        assert!(conns.is_cache_empty().await.unwrap());
    }
}
