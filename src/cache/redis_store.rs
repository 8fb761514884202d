//! Redis cache store.

use super::{CacheError, CacheStore};
use crate::config::CacheConfig;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionInfo, IntoConnectionInfo};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Cache store on a Redis server, reconnecting on demand.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    addr: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("addr", &self.addr).finish()
    }
}

/// Address, database and credentials for the configured server.
pub(crate) fn connection_info(config: &CacheConfig) -> Result<ConnectionInfo, CacheError> {
    let url = format!(
        "{}://{}:{}/{}",
        config.scheme, config.host, config.port, config.database
    );
    let mut info = url.into_connection_info()?;
    if !config.username.is_empty() {
        info.redis.username = Some(config.username.clone());
    }
    if !config.password.is_empty() {
        info.redis.password = Some(config.password.clone());
    }
    Ok(info)
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let info = connection_info(config)?;
        let addr = info.addr.to_string();
        let client = redis::Client::open(info)?;
        let mut manager = client.get_connection_manager().await?;

        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        info!(addr = %addr, db = config.database, "Cache connected");

        Ok(Self { manager, addr })
    }
}

impl CacheStore for RedisStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                conn.pset_ex::<_, _, ()>(key, value, millis).await?
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        // Blank values count as missing.
        Ok(value.filter(|bytes| !bytes.trim_ascii().is_empty()))
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(keys.to_vec()).await?;
        Ok(removed)
    }

    async fn close(&self) -> Result<(), CacheError> {
        // Connections close when the last manager clone is dropped.
        Ok(())
    }
}
