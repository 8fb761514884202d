//! Key-value cache with key prefixing.
//!
//! [`Cache`] is a thin proxy over a [`CacheStore`]: it namespaces every key
//! with the configured prefix and stores values as JSON.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::{CacheConfig, CacheDriver};
use crate::error::DbResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {message}")]
    Store { message: String },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Backend holding raw bytes under fully qualified keys.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`; `None` keeps it until deleted.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Fetch the bytes stored under `key`, `None` when absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send;

    /// Delete `keys`, returning how many existed.
    fn del(&self, keys: &[String]) -> impl Future<Output = Result<usize, CacheError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// Prefixing, JSON-encoding proxy over a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct Cache<S> {
    store: S,
    prefix: String,
    default_ttl: Option<Duration>,
}

/// Store selected at runtime by [`CacheConfig::driver`].
#[derive(Debug, Clone)]
pub enum CacheBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl CacheStore for CacheBackend {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        match self {
            Self::Memory(store) => store.set(key, value, ttl).await,
            Self::Redis(store) => store.set(key, value, ttl).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        match self {
            Self::Memory(store) => store.del(keys).await,
            Self::Redis(store) => store.del(keys).await,
        }
    }

    async fn close(&self) -> Result<(), CacheError> {
        match self {
            Self::Memory(store) => store.close().await,
            Self::Redis(store) => store.close().await,
        }
    }
}

impl Cache<CacheBackend> {
    /// Build the cache selected by `config`, connecting to Redis if configured.
    pub async fn open(config: &CacheConfig) -> DbResult<Self> {
        let store = match config.driver {
            CacheDriver::Memory => CacheBackend::Memory(MemoryStore::new()),
            CacheDriver::Redis => CacheBackend::Redis(RedisStore::connect(config).await?),
        };
        Ok(Self::with_store(store, config.prefix.clone(), config.default_ttl()))
    }
}

impl<S: CacheStore> Cache<S> {
    pub fn with_store(store: S, prefix: impl Into<String>, default_ttl: Option<Duration>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// Fully qualified key: `"{prefix}:{key}"`, or `key` when no prefix is set.
    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    /// Store `value` as JSON. `ttl` of `None` falls back to the configured default.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> DbResult<()>
    where
        T: Serialize + ?Sized,
    {
        let full_key = self.key(key);
        let bytes = serde_json::to_vec(value).map_err(CacheError::from)?;
        self.store
            .set(&full_key, bytes, ttl.or(self.default_ttl))
            .await?;
        debug!(key = %full_key, "Cache entry stored");
        Ok(())
    }

    /// Fetch and decode the value under `key`.
    ///
    /// A missing key is an error; check it with [`DbError::is_key_not_found`](crate::DbError::is_key_not_found).
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<T> {
        let full_key = self.key(key);
        let bytes = self
            .store
            .get(&full_key)
            .await?
            .ok_or(CacheError::KeyNotFound { key: full_key })?;
        Ok(serde_json::from_slice(&bytes).map_err(CacheError::from)?)
    }

    /// Delete `keys`, returning how many existed.
    pub async fn del(&self, keys: &[&str]) -> DbResult<usize> {
        let full_keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        Ok(self.store.del(&full_keys).await?)
    }

    pub async fn close(&self) -> DbResult<()> {
        Ok(self.store.close().await?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
