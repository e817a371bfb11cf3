//! Cache boundary with an in-memory fallback when Redis is not available.
//!
//! The engine only ever *invalidates* derived views here; lookups are a
//! read-through optimization for the stock-check aggregate and the daily
//! job marker. Failures at this boundary are logged and swallowed by the
//! callers, never propagated into a stock mutation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use thiserror::Error;

pub mod keys;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

/// In-memory cache implementation, used as the default backend and in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() > expires_at,
            None => false,
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_store(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = {
            let store = self.read_store();
            match store.get(key) {
                Some(entry) if entry.is_expired() => true,
                Some(entry) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            self.write_store().remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.write_store()
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.write_store().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let store = self.read_store();
        Ok(store.get(key).map(|e| !e.is_expired()).unwrap_or(false))
    }
}

/// Redis-backed cache for multi-instance deployments.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    pub fn from_url(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        Ok(Self::new(Arc::new(client)))
    }

    async fn connection(&self) -> Result<redis::aio::Connection, CacheError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs() as usize)
                .await
                .map_err(|e| CacheError::OperationFailed(e.to_string())),
            None => conn
                .set(key, value)
                .await
                .map_err(|e| CacheError::OperationFailed(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        conn.exists(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))
    }
}

/// Builds the configured cache backend. Unknown types fall back to
/// in-memory with a warning.
pub fn backend_from_config(cfg: &crate::config::CacheConfig) -> Arc<dyn CacheBackend> {
    match cfg.cache_type.as_str() {
        "redis" => match RedisCache::from_url(&cfg.redis_url) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!("Failed to initialize Redis cache ({}), using in-memory", e);
                Arc::new(InMemoryCache::new())
            }
        },
        "in-memory" => Arc::new(InMemoryCache::new()),
        other => {
            tracing::warn!("Unknown cache type '{}', using in-memory", other);
            Arc::new(InMemoryCache::new())
        }
    }
}
