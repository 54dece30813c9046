//! Redis Backend Adapter
//!
//! Implements the `KeyValueBackend` port over a deadpool-redis connection
//! pool. One `RedisBackend` is one shard.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::domain::ports::KeyValueBackend;
use crate::error::{Error, Result};

/// Keys requested per SCAN round-trip
const SCAN_BATCH: usize = 500;

/// Connection settings shared by every Redis shard.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// One URL per shard, in shard order
    pub urls: Vec<String>,
    /// Max pooled connections per shard
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: vec!["redis://127.0.0.1:6379".to_string()],
            pool_size: 16,
            timeout: Duration::from_millis(500),
        }
    }
}

/// A single Redis shard
pub struct RedisBackend {
    pool: Pool,
    url: String,
}

impl RedisBackend {
    /// Create a pooled backend for one URL.
    ///
    /// The pool connects lazily; use [`KeyValueBackend::ping`] to verify
    /// connectivity.
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self> {
        let mut config = Config::from_url(url);
        if let Some(ref mut pool_config) = config.pool {
            pool_config.max_size = pool_size;
            pool_config.timeouts.wait = Some(timeout);
            pool_config.timeouts.create = Some(timeout);
            pool_config.timeouts.recycle = Some(timeout);
        } else {
            let mut pool_config = deadpool_redis::PoolConfig::new(pool_size);
            pool_config.timeouts.wait = Some(timeout);
            pool_config.timeouts.create = Some(timeout);
            pool_config.timeouts.recycle = Some(timeout);
            config.pool = Some(pool_config);
        }

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Pool(format!("failed to create pool for {}: {}", url, e)))?;

        info!(url = %url, pool_size, "Created Redis shard pool");

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Create one backend per configured URL.
    pub fn connect_all(config: &RedisConfig) -> Result<Vec<Self>> {
        if config.urls.is_empty() {
            return Err(Error::Config("no Redis URLs configured".to_string()));
        }
        config
            .urls
            .iter()
            .map(|url| Self::connect(url, config.pool_size, config.timeout))
            .collect()
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

/// Redis takes whole seconds; round sub-second TTLs up so they still expire.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    fn name(&self) -> &str {
        &self.url
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value.as_ref(), ttl_seconds(ttl)).await?;
            }
            None => {
                let _: () = conn.set(key, value.as_ref()).await?;
            }
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(url = %self.url, pattern = %pattern, count = keys.len(), "SCAN complete");
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.expire(key, ttl_seconds(ttl) as i64).await?)
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.persist(key).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn().await?;
        let secs: i64 = conn.ttl(key).await?;
        // -2: missing, -1: no expiry
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, delta).await?)
    }

    async fn flush_all(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHALL").query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounding() {
        assert_eq!(ttl_seconds(Duration::from_secs(900)), 900);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
    }

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert_eq!(config.urls.len(), 1);
        assert_eq!(config.pool_size, 16);
    }

    #[tokio::test]
    async fn test_connect_builds_lazy_pool() {
        // No server is needed until a connection is requested
        let backend =
            RedisBackend::connect("redis://127.0.0.1:1", 2, Duration::from_millis(50)).unwrap();
        assert_eq!(backend.name(), "redis://127.0.0.1:1");
        assert!(backend.ping().await.is_err());
    }

    #[test]
    fn test_connect_all_requires_urls() {
        let config = RedisConfig {
            urls: vec![],
            ..Default::default()
        };
        assert!(matches!(
            RedisBackend::connect_all(&config),
            Err(Error::Config(_))
        ));
    }
}
