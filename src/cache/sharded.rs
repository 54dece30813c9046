//! Sharded Cache Provider
//!
//! Distributes keys over N key-value backends with a consistent hash ring.
//!
//! # Design
//!
//! - Single-key operations go to the owning shard only
//! - Reads that fail on the owner get exactly one retry on the next shard
//! - Multi-shard operations fan out concurrently and tolerate partial failure
//! - Every backend error is counted per shard, logged, and turned into a safe
//!   default

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::ring::{HashRing, DEFAULT_VIRTUAL_NODES};
use super::stats::{ShardStats, ShardStatsSnapshot};
use crate::domain::ports::{CacheProvider, CacheStats, KeyValueBackend};
use crate::error::Result;
use crate::monitoring::health::HealthStatus;

/// Sharding configuration
#[derive(Debug, Clone)]
pub struct ShardingConfig {
    /// Ring positions per physical shard
    pub virtual_nodes: usize,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
        }
    }
}

/// Liveness of one shard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardHealth {
    pub shard_index: usize,
    pub backend: String,
    pub healthy: bool,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Outcome of a rebalance request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceResult {
    pub performed: bool,
    pub keys_moved: u64,
    pub shard_count: usize,
    pub virtual_nodes: usize,
    pub message: String,
}

/// Cache provider spreading keys over several backends
pub struct ShardedCacheProvider {
    shards: Vec<Arc<dyn KeyValueBackend>>,
    ring: HashRing,
    stats: Vec<ShardStats>,
    /// Advisory only; operations are never refused
    healthy: AtomicBool,
}

impl ShardedCacheProvider {
    /// Create a provider with the default ring configuration
    pub fn new(backends: Vec<Arc<dyn KeyValueBackend>>) -> Result<Self> {
        Self::with_config(backends, ShardingConfig::default())
    }

    /// Create a provider with a custom ring configuration
    pub fn with_config(
        backends: Vec<Arc<dyn KeyValueBackend>>,
        config: ShardingConfig,
    ) -> Result<Self> {
        let ring = HashRing::new(backends.len(), config.virtual_nodes)?;
        let stats = backends.iter().map(|_| ShardStats::new()).collect();

        info!(
            shards = backends.len(),
            virtual_nodes = config.virtual_nodes,
            ring_size = ring.len(),
            "Initialized sharded cache provider"
        );

        Ok(Self {
            shards: backends,
            ring,
            stats,
            healthy: AtomicBool::new(true),
        })
    }

    /// Index of the shard owning `key`
    pub fn shard_for(&self, key: &str) -> usize {
        self.ring.shard_for(key)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    /// Counters for one shard
    pub fn shard_stats(&self, index: usize) -> Option<ShardStatsSnapshot> {
        self.stats.get(index).map(|s| s.snapshot(index))
    }

    /// Counters for every shard
    pub fn all_shard_stats(&self) -> Vec<ShardStatsSnapshot> {
        self.stats
            .iter()
            .enumerate()
            .map(|(i, s)| s.snapshot(i))
            .collect()
    }

    /// Result of the last health check
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn fallback_index(&self, owner: usize) -> Option<usize> {
        let n = self.shards.len();
        (n > 1).then(|| (owner + 1) % n)
    }

    fn record_read(&self, shard: usize, hit: bool) {
        if hit {
            self.stats[shard].record_hit();
        } else {
            self.stats[shard].record_miss();
        }
    }

    fn record_failure(&self, shard: usize, operation: &str, key: &str, error: &crate::Error) {
        self.stats[shard].record_error();
        warn!(
            shard,
            backend = %self.shards[shard].name(),
            operation,
            key = %key,
            kind = error.kind(),
            error = %error,
            "Cache backend operation failed"
        );
    }

    /// Ping every shard concurrently.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Vec<ShardHealth> {
        let probes = self.shards.iter().enumerate().map(|(index, shard)| async move {
            let start = Instant::now();
            let result = shard.ping().await;
            ShardHealth {
                shard_index: index,
                backend: shard.name().to_string(),
                healthy: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                latency_ms: start.elapsed().as_millis() as u64,
            }
        });

        let results = join_all(probes).await;
        let all_healthy = results.iter().all(|h| h.healthy);
        if self.healthy.swap(all_healthy, Ordering::Relaxed) != all_healthy {
            info!(healthy = all_healthy, "Sharded cache health changed");
        }
        results
    }

    /// Summarize shard health: healthy, degraded (some shards down), or unhealthy.
    pub fn classify_health(results: &[ShardHealth]) -> HealthStatus {
        let up = results.iter().filter(|h| h.healthy).count();
        if up == results.len() {
            HealthStatus::Healthy
        } else if up > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Rebalancing is not implemented; the ring is fixed for the provider's life.
    pub async fn rebalance(&self) -> RebalanceResult {
        info!("Rebalance requested; ring is immutable, nothing to move");
        RebalanceResult {
            performed: false,
            keys_moved: 0,
            shard_count: self.ring.shard_count(),
            virtual_nodes: self.ring.virtual_nodes(),
            message: "rebalancing is not supported; keys stay on their current shards"
                .to_string(),
        }
    }
}

impl std::fmt::Debug for ShardedCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedCacheProvider")
            .field("shard_count", &self.shards.len())
            .field("virtual_nodes", &self.ring.virtual_nodes())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[async_trait]
impl CacheProvider for ShardedCacheProvider {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let owner = self.shard_for(key);
        match self.shards[owner].get(key).await {
            Ok(value) => {
                self.record_read(owner, value.is_some());
                value
            }
            Err(e) => {
                self.record_failure(owner, "GET", key, &e);
                let fallback = self.fallback_index(owner)?;
                match self.shards[fallback].get(key).await {
                    Ok(value) => {
                        debug!(key = %key, owner, fallback, found = value.is_some(), "Served read from fallback shard");
                        self.record_read(fallback, value.is_some());
                        value
                    }
                    Err(e) => {
                        self.record_failure(fallback, "GET(fallback)", key, &e);
                        None
                    }
                }
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let index = self.shard_for(key);
        let ttl = (!ttl.is_zero()).then_some(ttl);
        match self.shards[index].set(key, value, ttl).await {
            Ok(()) => self.stats[index].record_write(),
            Err(e) => self.record_failure(index, "SET", key, &e),
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let index = self.shard_for(key);
        match self.shards[index].del(&[key.to_string()]).await {
            Ok(removed) => {
                self.stats[index].record_deletes(removed);
                removed > 0
            }
            Err(e) => {
                self.record_failure(index, "DEL", key, &e);
                false
            }
        }
    }

    async fn delete_all(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }

        let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
        for key in keys {
            groups.entry(self.shard_for(key)).or_default().push(key.clone());
        }

        let batches = groups.into_iter().map(|(index, batch)| async move {
            match self.shards[index].del(&batch).await {
                Ok(removed) => {
                    self.stats[index].record_deletes(removed);
                    removed
                }
                Err(e) => {
                    let label = format!("{} keys", batch.len());
                    self.record_failure(index, "DEL(batch)", &label, &e);
                    0
                }
            }
        });

        join_all(batches).await.into_iter().sum()
    }

    async fn find_keys(&self, pattern: &str) -> Vec<String> {
        let scans = self.shards.iter().enumerate().map(|(index, shard)| async move {
            match shard.scan(pattern).await {
                Ok(keys) => keys,
                Err(e) => {
                    self.record_failure(index, "SCAN", pattern, &e);
                    Vec::new()
                }
            }
        });

        let mut keys: Vec<String> = join_all(scans).await.into_iter().flatten().collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    async fn exists(&self, key: &str) -> bool {
        let index = self.shard_for(key);
        match self.shards[index].exists(key).await {
            Ok(found) => found,
            Err(e) => {
                self.record_failure(index, "EXISTS", key, &e);
                false
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let index = self.shard_for(key);
        // Zero means no expiry, same as `set`
        let (operation, result) = if ttl.is_zero() {
            ("PERSIST", self.shards[index].persist(key).await)
        } else {
            ("EXPIRE", self.shards[index].expire(key, ttl).await)
        };
        match result {
            Ok(updated) => updated,
            Err(e) => {
                self.record_failure(index, operation, key, &e);
                false
            }
        }
    }

    async fn get_ttl(&self, key: &str) -> Option<Duration> {
        let index = self.shard_for(key);
        match self.shards[index].ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                self.record_failure(index, "TTL", key, &e);
                None
            }
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> i64 {
        let index = self.shard_for(key);
        match self.shards[index].incr_by(key, delta).await {
            Ok(value) => {
                self.stats[index].record_write();
                value
            }
            Err(e) => {
                self.record_failure(index, "INCRBY", key, &e);
                0
            }
        }
    }

    async fn clear(&self) {
        let flushes = self.shards.iter().enumerate().map(|(index, shard)| async move {
            if let Err(e) = shard.flush_all().await {
                self.record_failure(index, "FLUSHALL", "*", &e);
            }
        });
        join_all(flushes).await;
        info!(shards = self.shards.len(), "Cleared all cache shards");
    }

    fn stats(&self) -> CacheStats {
        // Backend-internal evictions, size and memory are not aggregated
        CacheStats {
            hits: self.stats.iter().map(|s| s.hits()).sum(),
            misses: self.stats.iter().map(|s| s.misses()).sum(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
