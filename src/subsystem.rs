//! Cache Subsystem
//!
//! Owns the sharded provider, the analytics and invalidation services, the
//! domain event bus and their background tasks. Tasks are started explicitly
//! and joined on shutdown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{DomainEventBus, InMemoryBackend, RedisBackend, RedisConfig};
use crate::analytics::{AnalyticsConfig, AnalyticsService, CacheDashboardData};
use crate::cache::{ObservedCacheProvider, ShardStatsSnapshot, ShardedCacheProvider, ShardingConfig};
use crate::domain::ports::{CacheProvider, KeyValueBackend};
use crate::error::Result;
use crate::invalidation::{InvalidationConfig, InvalidationService, InvalidationStats};
use crate::monitoring::health::{HealthResponse, ProbeState};

/// Configuration for the whole subsystem
#[derive(Debug, Clone)]
pub struct CacheSubsystemConfig {
    pub sharding: ShardingConfig,
    pub invalidation: InvalidationConfig,
    pub analytics: AnalyticsConfig,
    /// How often shards are pinged to refresh the health flag
    pub health_check_interval: Duration,
}

impl Default for CacheSubsystemConfig {
    fn default() -> Self {
        Self {
            sharding: ShardingConfig::default(),
            invalidation: InvalidationConfig::default(),
            analytics: AnalyticsConfig::default(),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Combined report for the dashboard endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub healthy: bool,
    pub shards: Vec<ShardStatsSnapshot>,
    pub invalidation: InvalidationStats,
    pub dashboard: CacheDashboardData,
}

/// The feed cache and everything that keeps it fresh
pub struct CacheSubsystem {
    config: CacheSubsystemConfig,
    sharded: Arc<ShardedCacheProvider>,
    cache: Arc<ObservedCacheProvider>,
    analytics: Arc<AnalyticsService>,
    invalidation: Arc<InvalidationService>,
    events: Arc<DomainEventBus>,
    probes: ProbeState,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheSubsystem {
    /// Wire the subsystem over existing backends. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(backends: Vec<Arc<dyn KeyValueBackend>>, config: CacheSubsystemConfig) -> Result<Self> {
        let sharded = Arc::new(ShardedCacheProvider::with_config(
            backends,
            config.sharding.clone(),
        )?);
        let analytics = Arc::new(AnalyticsService::new(config.analytics.clone()));
        let cache = Arc::new(ObservedCacheProvider::new(
            sharded.clone(),
            analytics.clone(),
        ));
        let invalidation = Arc::new(InvalidationService::new(
            cache.clone(),
            config.invalidation.clone(),
        ));

        let events = Arc::new(DomainEventBus::new());
        events.subscribe(invalidation.clone());

        Ok(Self {
            config,
            sharded,
            cache,
            analytics,
            invalidation,
            events,
            probes: ProbeState::new(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// One Redis shard per configured URL.
    pub fn with_redis(redis: &RedisConfig, config: CacheSubsystemConfig) -> Result<Self> {
        let backends = RedisBackend::connect_all(redis)?
            .into_iter()
            .map(|b| Arc::new(b) as Arc<dyn KeyValueBackend>)
            .collect();
        Self::new(backends, config)
    }

    /// `shards` in-process backends, for local runs and tests.
    pub fn in_memory(shards: usize, config: CacheSubsystemConfig) -> Result<Self> {
        let backends = (0..shards)
            .map(|i| Arc::new(InMemoryBackend::new(format!("memory-{}", i))) as Arc<dyn KeyValueBackend>)
            .collect();
        Self::new(backends, config)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The cache contract for feed assembly and preference lookups.
    pub fn cache(&self) -> Arc<dyn CacheProvider> {
        self.cache.clone()
    }

    pub fn observed(&self) -> &Arc<ObservedCacheProvider> {
        &self.cache
    }

    pub fn sharded(&self) -> &Arc<ShardedCacheProvider> {
        &self.sharded
    }

    pub fn analytics(&self) -> &Arc<AnalyticsService> {
        &self.analytics
    }

    pub fn invalidation(&self) -> &Arc<InvalidationService> {
        &self.invalidation
    }

    /// Publisher that feeds domain events into invalidation.
    pub fn events(&self) -> &Arc<DomainEventBus> {
        &self.events
    }

    pub fn probes(&self) -> &ProbeState {
        &self.probes
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the analytics, invalidation and health-check loops.
    ///
    /// A subsystem that has been shut down cannot be started again.
    pub fn start(&self) {
        if self.shutdown.is_cancelled() {
            warn!("Cache subsystem already shut down, not starting");
            return;
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Cache subsystem already started");
            return;
        }

        tasks.push(tokio::spawn(
            self.analytics.clone().run(self.shutdown.child_token()),
        ));
        tasks.push(tokio::spawn(
            self.invalidation.clone().run(self.shutdown.child_token()),
        ));
        tasks.push(tokio::spawn(run_health_checks(
            self.sharded.clone(),
            self.config.health_check_interval,
            self.shutdown.child_token(),
        )));

        self.probes.set_ready(true);
        info!(
            shards = self.sharded.shard_count(),
            tasks = tasks.len(),
            "Cache subsystem started"
        );
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.probes.set_ready(false);
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Cache subsystem stopped");
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Ping all shards and combine with the start state.
    pub async fn readiness(&self) -> HealthResponse {
        let shards = self.sharded.health_check().await;
        self.probes.readiness(&shards)
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            healthy: self.sharded.is_healthy(),
            shards: self.sharded.all_shard_stats(),
            invalidation: self.invalidation.stats(),
            dashboard: self.analytics.cache_dashboard_data(),
        }
    }
}

async fn run_health_checks(
    sharded: Arc<ShardedCacheProvider>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let results = sharded.health_check().await;
                for shard in results.iter().filter(|s| !s.healthy) {
                    warn!(
                        shard = shard.shard_index,
                        backend = %shard.backend,
                        error = shard.error.as_deref().unwrap_or("unknown"),
                        "Shard failed health check"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::feed_key;
    use crate::domain::events::{ContentPublishedEvent, InvalidationEvent};
    use crate::domain::ports::{EventPublisher, FeedType};
    use bytes::Bytes;

    #[test]
    fn test_requires_shards() {
        assert!(CacheSubsystem::in_memory(0, CacheSubsystemConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let subsystem = CacheSubsystem::in_memory(3, CacheSubsystemConfig::default()).unwrap();
        assert!(!subsystem.is_running());
        assert!(!subsystem.probes().is_ready());

        subsystem.start();
        subsystem.start();
        assert!(subsystem.is_running());
        assert!(subsystem.probes().is_ready());

        tokio::time::timeout(Duration::from_secs(2), subsystem.shutdown())
            .await
            .unwrap();
        assert!(!subsystem.is_running());
        assert!(!subsystem.probes().is_ready());
    }

    #[tokio::test]
    async fn test_no_restart_after_shutdown() {
        let subsystem = CacheSubsystem::in_memory(2, CacheSubsystemConfig::default()).unwrap();
        subsystem.start();
        subsystem.shutdown().await;

        subsystem.start();
        assert!(!subsystem.is_running());
        assert!(!subsystem.probes().is_ready());
        assert_eq!(
            subsystem.readiness().await.status,
            crate::monitoring::HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_events_reach_invalidation() {
        let subsystem = CacheSubsystem::in_memory(2, CacheSubsystemConfig::default()).unwrap();
        let cache = subsystem.cache();
        let key = feed_key("fan", FeedType::Home);
        cache.set(&key, Bytes::from("[]"), Duration::ZERO).await;

        let event = ContentPublishedEvent::new("c1", "creator", vec![])
            .with_followers(vec!["fan".to_string()]);
        subsystem.events().dispatch(event.into()).await.unwrap();
        assert!(!cache.exists(&key).await);

        // Fire-and-forget path returns before delivery
        subsystem
            .events()
            .publish(ContentPublishedEvent::new("c2", "creator", vec![]).into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_queue_runs_after_start() {
        let subsystem = CacheSubsystem::in_memory(2, CacheSubsystemConfig::default()).unwrap();
        let key = feed_key("u1", FeedType::Trending);
        subsystem
            .cache()
            .set(&key, Bytes::from("[]"), Duration::ZERO)
            .await;

        subsystem.start();
        subsystem
            .invalidation()
            .submit(InvalidationEvent::AllUserFeeds {
                user_id: "u1".to_string(),
            })
            .unwrap();

        for _ in 0..100 {
            if subsystem.invalidation().stats().events_processed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!subsystem.cache().exists(&key).await);
        subsystem.shutdown().await;
    }

    #[tokio::test]
    async fn test_report() {
        let subsystem = CacheSubsystem::in_memory(2, CacheSubsystemConfig::default()).unwrap();
        subsystem.cache().get("v1:feed:u1:HOME").await;

        let report = subsystem.report();
        assert_eq!(report.shards.len(), 2);
        assert_eq!(report.dashboard.analytics.total_misses, 1);
        assert!(report.healthy);
    }
}
