//! Cache Analytics Service
//!
//! Observes cache traffic, keeps per-key and per-pattern metrics, derives TTL
//! recommendations and tunes the adaptive cache configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::metrics::{now_millis, CacheMetricEntry, PatternMetrics, PatternSnapshot};
use super::optimizer::{apply_multiplier, AdaptiveCacheConfig, CapacityAdjustment, TtlOptimization};
use crate::cache::key::extract_pattern;

/// Analytics configuration
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// How often stale metrics are purged
    pub cleanup_interval: Duration,
    /// Per-key metrics idle longer than this are dropped
    pub key_retention: Duration,
    /// Per-pattern metrics idle longer than this are dropped
    pub pattern_retention: Duration,
    /// Size of the hot-key list
    pub hot_key_limit: usize,
    /// Operations after which a hot key earns a recommendation
    pub hot_key_threshold: u64,
    /// Starting point for the adaptive configuration
    pub adaptive: AdaptiveCacheConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            key_retention: Duration::from_secs(60 * 60),
            pattern_retention: Duration::from_secs(24 * 60 * 60),
            hot_key_limit: 10,
            hot_key_threshold: 100,
            adaptive: AdaptiveCacheConfig::default(),
        }
    }
}

/// Overall cache health class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheHealth {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl CacheHealth {
    pub fn classify(hit_rate: f64, eviction_rate: f64) -> Self {
        if hit_rate > 0.8 && eviction_rate < 0.05 {
            CacheHealth::Excellent
        } else if hit_rate > 0.7 && eviction_rate < 0.1 {
            CacheHealth::Good
        } else if hit_rate > 0.5 && eviction_rate < 0.2 {
            CacheHealth::Fair
        } else {
            CacheHealth::Poor
        }
    }
}

/// Frequently accessed key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotKey {
    pub key: String,
    pub operation_count: u64,
    pub hit_rate: f64,
}

/// Summary served to dashboards
#[derive(Debug, Clone, Serialize)]
pub struct CacheAnalytics {
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_writes: u64,
    pub total_evictions: u64,
    pub hit_rate: f64,
    pub eviction_rate: f64,
    pub average_response_time_ms: f64,
    pub health: CacheHealth,
    pub tracked_keys: usize,
    pub tracked_patterns: usize,
    pub adaptive_config: AdaptiveCacheConfig,
    pub generated_at: DateTime<Utc>,
}

/// Full dashboard payload
#[derive(Debug, Clone, Serialize)]
pub struct CacheDashboardData {
    pub analytics: CacheAnalytics,
    pub top_patterns: Vec<PatternSnapshot>,
    pub hot_keys: Vec<HotKey>,
    pub ttl_optimizations: Vec<TtlOptimization>,
    pub recommendations: Vec<String>,
}

/// Result of one optimization tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub patterns_optimized: usize,
    pub capacity: CapacityAdjustment,
}

/// Analytics and adaptive tuning
pub struct AnalyticsService {
    config: AnalyticsConfig,
    key_metrics: DashMap<String, CacheMetricEntry>,
    pattern_metrics: DashMap<String, Arc<PatternMetrics>>,
    optimizations: DashMap<String, TtlOptimization>,
    adaptive: Mutex<AdaptiveCacheConfig>,
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    total_writes: AtomicU64,
    total_evictions: AtomicU64,
    total_operations: AtomicU64,
    total_response_time_us: AtomicU64,
}

impl AnalyticsService {
    pub fn new(config: AnalyticsConfig) -> Self {
        let adaptive = Mutex::new(config.adaptive.clone());
        Self {
            config,
            key_metrics: DashMap::new(),
            pattern_metrics: DashMap::new(),
            optimizations: DashMap::new(),
            adaptive,
            total_hits: AtomicU64::new(0),
            total_misses: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
            total_operations: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    // =========================================================================
    // Recording
    // =========================================================================

    fn pattern_for(&self, key: &str, now: i64) -> Arc<PatternMetrics> {
        let pattern = extract_pattern(key);
        self.pattern_metrics
            .entry(pattern.clone())
            .or_insert_with(|| Arc::new(PatternMetrics::new(pattern, now)))
            .clone()
    }

    fn record_global(&self, latency: Duration) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(
            latency.as_micros().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );
    }

    pub fn record_hit(&self, key: &str, latency: Duration) {
        let now = now_millis();
        self.key_metrics
            .entry(key.to_string())
            .or_insert_with(|| CacheMetricEntry::new(key, now))
            .record_hit(latency, now);
        self.pattern_for(key, now).record_hit(latency, now);
        self.total_hits.fetch_add(1, Ordering::Relaxed);
        self.record_global(latency);
    }

    pub fn record_miss(&self, key: &str, latency: Duration) {
        let now = now_millis();
        self.key_metrics
            .entry(key.to_string())
            .or_insert_with(|| CacheMetricEntry::new(key, now))
            .record_miss(latency, now);
        self.pattern_for(key, now).record_miss(latency, now);
        self.total_misses.fetch_add(1, Ordering::Relaxed);
        self.record_global(latency);
    }

    pub fn record_write(&self, key: &str, size: u64, latency: Duration) {
        let now = now_millis();
        self.key_metrics
            .entry(key.to_string())
            .or_insert_with(|| CacheMetricEntry::new(key, now))
            .record_write(size, latency, now);
        self.pattern_for(key, now).record_operation(latency, now);
        self.total_writes.fetch_add(1, Ordering::Relaxed);
        self.record_global(latency);
    }

    pub fn record_eviction(&self, key: &str) {
        let now = now_millis();
        self.key_metrics
            .entry(key.to_string())
            .or_insert_with(|| CacheMetricEntry::new(key, now))
            .record_eviction(now);
        self.pattern_for(key, now)
            .record_operation(Duration::ZERO, now);
        self.total_evictions.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn total_evictions(&self) -> u64 {
        self.total_evictions.load(Ordering::Relaxed)
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed)
    }

    pub fn global_hit_rate(&self) -> f64 {
        let hits = self.total_hits();
        let reads = hits + self.total_misses();
        if reads == 0 {
            0.0
        } else {
            hits as f64 / reads as f64
        }
    }

    /// Evictions per read, 0 before any read.
    pub fn eviction_rate(&self) -> f64 {
        let reads = self.total_hits() + self.total_misses();
        if reads == 0 {
            0.0
        } else {
            self.total_evictions() as f64 / reads as f64
        }
    }

    pub fn average_response_time(&self) -> Duration {
        let ops = self.total_operations.load(Ordering::Relaxed);
        if ops == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_response_time_us.load(Ordering::Relaxed) / ops)
        }
    }

    /// Hit rate of a pattern, `None` if it has never been seen.
    pub fn pattern_hit_rate(&self, pattern: &str) -> Option<f64> {
        self.pattern_metrics
            .get(pattern)
            .map(|m| m.calculate_hit_rate())
    }

    pub fn pattern_snapshot(&self, pattern: &str) -> Option<PatternSnapshot> {
        self.pattern_metrics.get(pattern).map(|m| m.snapshot())
    }

    pub fn key_metrics(&self, key: &str) -> Option<CacheMetricEntry> {
        self.key_metrics.get(key).map(|e| e.clone())
    }

    pub fn optimization(&self, pattern: &str) -> Option<TtlOptimization> {
        self.optimizations.get(pattern).map(|o| o.clone())
    }

    pub fn tracked_keys(&self) -> usize {
        self.key_metrics.len()
    }

    pub fn tracked_patterns(&self) -> usize {
        self.pattern_metrics.len()
    }

    pub fn adaptive_config(&self) -> AdaptiveCacheConfig {
        self.adaptive.lock().clone()
    }

    /// TTL to use for keys of `pattern`.
    ///
    /// Without a recommendation backed by enough samples the default is
    /// returned untouched.
    pub fn get_optimal_ttl(&self, pattern: &str, default_ttl: Duration) -> Duration {
        match self.optimizations.get(pattern) {
            Some(opt) if opt.sample_count >= super::optimizer::MIN_SAMPLES => {
                apply_multiplier(default_ttl, opt.recommended_multiplier)
            }
            _ => default_ttl,
        }
    }

    pub fn health(&self) -> CacheHealth {
        CacheHealth::classify(self.global_hit_rate(), self.eviction_rate())
    }

    /// Top keys by operation count, busiest first.
    pub fn hot_keys(&self, limit: usize) -> Vec<HotKey> {
        let mut keys: Vec<HotKey> = self
            .key_metrics
            .iter()
            .map(|e| HotKey {
                key: e.key().clone(),
                operation_count: e.operation_count,
                hit_rate: e.hit_rate(),
            })
            .collect();
        keys.sort_by(|a, b| {
            b.operation_count
                .cmp(&a.operation_count)
                .then_with(|| a.key.cmp(&b.key))
        });
        keys.truncate(limit);
        keys
    }

    /// Human-readable tuning suggestions. Informational only.
    pub fn recommendations(&self) -> Vec<String> {
        let mut recommendations = Vec::new();
        let reads = self.total_hits() + self.total_misses();

        if reads > 0 {
            let hit_rate = self.global_hit_rate();
            if hit_rate < 0.7 {
                recommendations.push(format!(
                    "Hit rate is {:.1}%; consider increasing TTLs for frequently missed patterns",
                    hit_rate * 100.0
                ));
            }

            let eviction_rate = self.eviction_rate();
            if eviction_rate > 0.1 {
                recommendations.push(format!(
                    "Eviction rate is {:.1}%; consider increasing cache capacity (max size {})",
                    eviction_rate * 100.0,
                    self.adaptive.lock().max_cache_size
                ));
            }
        }

        for hot in self
            .hot_keys(self.config.hot_key_limit)
            .into_iter()
            .filter(|h| h.operation_count >= self.config.hot_key_threshold)
        {
            recommendations.push(format!(
                "Hot key {} ({} operations); consider local caching or a longer TTL",
                hot.key, hot.operation_count
            ));
        }

        recommendations
    }

    pub fn cache_analytics(&self) -> CacheAnalytics {
        CacheAnalytics {
            total_hits: self.total_hits(),
            total_misses: self.total_misses(),
            total_writes: self.total_writes(),
            total_evictions: self.total_evictions(),
            hit_rate: self.global_hit_rate(),
            eviction_rate: self.eviction_rate(),
            average_response_time_ms: self.average_response_time().as_secs_f64() * 1000.0,
            health: self.health(),
            tracked_keys: self.tracked_keys(),
            tracked_patterns: self.tracked_patterns(),
            adaptive_config: self.adaptive_config(),
            generated_at: Utc::now(),
        }
    }

    pub fn cache_dashboard_data(&self) -> CacheDashboardData {
        let mut top_patterns: Vec<PatternSnapshot> = self
            .pattern_metrics
            .iter()
            .map(|m| m.snapshot())
            .collect();
        top_patterns.sort_by(|a, b| b.total_operations.cmp(&a.total_operations));
        top_patterns.truncate(self.config.hot_key_limit);

        let mut ttl_optimizations: Vec<TtlOptimization> =
            self.optimizations.iter().map(|o| o.clone()).collect();
        ttl_optimizations.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        CacheDashboardData {
            analytics: self.cache_analytics(),
            top_patterns,
            hot_keys: self.hot_keys(self.config.hot_key_limit),
            ttl_optimizations,
            recommendations: self.recommendations(),
        }
    }

    // =========================================================================
    // Optimization
    // =========================================================================

    /// Recompute TTL recommendations for every pattern with enough samples,
    /// then take one capacity tuning step.
    #[instrument(skip(self))]
    pub fn run_optimization_cycle(&self) -> OptimizationReport {
        let mut patterns_optimized = 0;
        for metrics in self.pattern_metrics.iter() {
            if let Some(optimization) = TtlOptimization::from_metrics(metrics.value()) {
                debug!(
                    pattern = %optimization.pattern,
                    multiplier = optimization.recommended_multiplier,
                    samples = optimization.sample_count,
                    confidence = optimization.confidence,
                    "Updated TTL recommendation"
                );
                self.optimizations
                    .insert(optimization.pattern.clone(), optimization);
                patterns_optimized += 1;
            }
        }

        let capacity = self.tune_capacity();
        info!(patterns_optimized, ?capacity, "Optimization cycle complete");

        OptimizationReport {
            patterns_optimized,
            capacity,
        }
    }

    /// One capacity step; a single critical section so concurrent ticks
    /// cannot lose updates.
    pub fn tune_capacity(&self) -> CapacityAdjustment {
        let hit_rate = self.global_hit_rate();
        let evictions = self.total_evictions();
        let mut adaptive = self.adaptive.lock();
        adaptive.tune(hit_rate, evictions)
    }

    pub fn set_adaptive_enabled(&self, enabled: bool) {
        self.adaptive.lock().adaptive_enabled = enabled;
    }

    /// Drop idle metrics. Returns `(keys_removed, patterns_removed)`.
    pub fn cleanup_stale_metrics(&self) -> (usize, usize) {
        self.cleanup_stale_metrics_at(now_millis())
    }

    /// [`Self::cleanup_stale_metrics`] against an explicit clock.
    pub fn cleanup_stale_metrics_at(&self, now: i64) -> (usize, usize) {
        let keys_before = self.key_metrics.len();
        let key_retention = self.config.key_retention;
        self.key_metrics
            .retain(|_, entry| !entry.is_idle(now, key_retention));

        let patterns_before = self.pattern_metrics.len();
        let pattern_retention = self.config.pattern_retention;
        self.pattern_metrics
            .retain(|_, metrics| !metrics.is_idle(now, pattern_retention));
        self.optimizations
            .retain(|pattern, _| self.pattern_metrics.contains_key(pattern));

        let removed = (
            keys_before.saturating_sub(self.key_metrics.len()),
            patterns_before.saturating_sub(self.pattern_metrics.len()),
        );
        if removed != (0, 0) {
            debug!(
                keys_removed = removed.0,
                patterns_removed = removed.1,
                "Purged stale cache metrics"
            );
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn insert_optimization(&self, optimization: TtlOptimization) {
        self.optimizations
            .insert(optimization.pattern.clone(), optimization);
    }

    // =========================================================================
    // Background Loop
    // =========================================================================

    /// Run optimization and cleanup until cancelled.
    #[instrument(skip_all, name = "analytics_loop")]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let optimization_period = self.adaptive.lock().optimization_interval;
        let cleanup_period = self.config.cleanup_interval;
        info!(
            optimization_secs = optimization_period.as_secs(),
            cleanup_secs = cleanup_period.as_secs(),
            "Starting cache analytics loop"
        );

        let mut optimize = interval_at(Instant::now() + optimization_period, optimization_period);
        optimize.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = interval_at(Instant::now() + cleanup_period, cleanup_period);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cache analytics loop stopped");
                    break;
                }
                _ = optimize.tick() => {
                    self.run_optimization_cycle();
                }
                _ = cleanup.tick() => {
                    self.cleanup_stale_metrics();
                }
            }
        }
    }
}

impl Default for AnalyticsService {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::optimizer::{MAX_TTL, MIN_TTL};

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_records_into_key_and_pattern() {
        let analytics = AnalyticsService::default();
        analytics.record_hit("v1:feed:u1:HOME", MS);
        analytics.record_miss("v1:feed:u2:HOME", MS);
        analytics.record_write("v1:feed:u2:HOME", 256, MS);

        assert_eq!(analytics.tracked_keys(), 2);
        assert_eq!(analytics.tracked_patterns(), 1);
        assert_eq!(analytics.pattern_hit_rate("v1:feed:*"), Some(0.5));
        assert_eq!(analytics.pattern_hit_rate("v1:prefs:*"), None);

        let entry = analytics.key_metrics("v1:feed:u2:HOME").unwrap();
        assert_eq!(entry.operation_count, 2);
        assert_eq!(entry.estimated_size, 256);
        assert_eq!(analytics.total_writes(), 1);
    }

    #[test]
    fn test_optimal_ttl_defaults_without_samples() {
        let analytics = AnalyticsService::default();
        for _ in 0..99 {
            analytics.record_hit("v1:feed:u1:HOME", MS);
        }
        analytics.run_optimization_cycle();

        // Below the sample threshold the default is returned unclamped
        assert_eq!(
            analytics.get_optimal_ttl("v1:feed:*", Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_optimal_ttl_after_cycle() {
        let analytics = AnalyticsService::default();
        for _ in 0..150 {
            analytics.record_hit("v1:feed:u1:HOME", MS);
        }
        for _ in 0..50 {
            analytics.record_miss("v1:feed:u1:HOME", MS);
        }

        let report = analytics.run_optimization_cycle();
        assert_eq!(report.patterns_optimized, 1);

        let optimization = analytics.optimization("v1:feed:*").unwrap();
        assert_eq!(optimization.recommended_multiplier, 1.5);
        assert_eq!(optimization.sample_count, 200);
        assert_eq!(
            analytics.get_optimal_ttl("v1:feed:*", Duration::from_secs(900)),
            Duration::from_secs(1350)
        );
    }

    #[test]
    fn test_optimal_ttl_is_clamped() {
        let analytics = AnalyticsService::default();
        analytics.insert_optimization(TtlOptimization {
            pattern: "v1:popularity:*".to_string(),
            recommended_multiplier: 0.1,
            sample_count: 500,
            confidence: 1.0,
            last_updated: Utc::now(),
        });

        assert_eq!(
            analytics.get_optimal_ttl("v1:popularity:*", Duration::from_secs(60)),
            MIN_TTL
        );
        assert!(analytics.get_optimal_ttl("v1:popularity:*", Duration::from_secs(48 * 3600)) <= MAX_TTL);
    }

    #[test]
    fn test_health_classes() {
        assert_eq!(CacheHealth::classify(0.85, 0.01), CacheHealth::Excellent);
        assert_eq!(CacheHealth::classify(0.85, 0.07), CacheHealth::Good);
        assert_eq!(CacheHealth::classify(0.75, 0.01), CacheHealth::Good);
        assert_eq!(CacheHealth::classify(0.6, 0.15), CacheHealth::Fair);
        assert_eq!(CacheHealth::classify(0.9, 0.5), CacheHealth::Poor);
        assert_eq!(CacheHealth::classify(0.4, 0.0), CacheHealth::Poor);
    }

    #[test]
    fn test_eviction_rate() {
        let analytics = AnalyticsService::default();
        assert_eq!(analytics.eviction_rate(), 0.0);

        for i in 0..10 {
            analytics.record_hit(&format!("k{}", i), MS);
        }
        analytics.record_eviction("k0");
        assert!((analytics.eviction_rate() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_grows_on_low_hit_rate() {
        let analytics = AnalyticsService::default();
        analytics.record_hit("k", MS);
        analytics.record_miss("k", MS);
        analytics.record_miss("k", MS);
        analytics.record_eviction("k");

        let report = analytics.run_optimization_cycle();
        assert!(matches!(report.capacity, CapacityAdjustment::Grow { .. }));
        assert_eq!(analytics.adaptive_config().max_cache_size, 110_000);

        analytics.set_adaptive_enabled(false);
        assert_eq!(analytics.tune_capacity(), CapacityAdjustment::Disabled);
    }

    #[test]
    fn test_hot_keys_and_recommendations() {
        let analytics = AnalyticsService::default();
        for _ in 0..120 {
            analytics.record_hit("v1:prefs:celebrity", MS);
        }
        for i in 0..20 {
            analytics.record_miss(&format!("v1:feed:u{}:HOME", i), MS);
        }

        let hot = analytics.hot_keys(3);
        assert_eq!(hot.len(), 3);
        assert_eq!(hot[0].key, "v1:prefs:celebrity");
        assert_eq!(hot[0].operation_count, 120);

        let recommendations = analytics.recommendations();
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].contains("v1:prefs:celebrity"));

        for i in 0..200 {
            analytics.record_miss(&format!("v1:feed:x{}:HOME", i), MS);
        }
        let recommendations = analytics.recommendations();
        assert!(recommendations.iter().any(|r| r.starts_with("Hit rate")));
    }

    #[test]
    fn test_no_recommendations_without_traffic() {
        let analytics = AnalyticsService::default();
        assert!(analytics.recommendations().is_empty());
        assert_eq!(analytics.health(), CacheHealth::Poor);
    }

    #[test]
    fn test_cleanup_stale_metrics() {
        let analytics = AnalyticsService::default();
        analytics.record_hit("v1:feed:u1:HOME", MS);
        for _ in 0..100 {
            analytics.record_hit("v1:feed:u1:HOME", MS);
        }
        analytics.run_optimization_cycle();

        let now = now_millis();
        assert_eq!(analytics.cleanup_stale_metrics_at(now), (0, 0));

        // Keys expire after an hour, patterns survive until a day
        let two_hours = now + 2 * 3_600_000;
        assert_eq!(analytics.cleanup_stale_metrics_at(two_hours), (1, 0));
        assert!(analytics.optimization("v1:feed:*").is_some());

        let two_days = now + 48 * 3_600_000;
        assert_eq!(analytics.cleanup_stale_metrics_at(two_days), (0, 1));
        assert!(analytics.optimization("v1:feed:*").is_none());
    }

    #[test]
    fn test_dashboard_serializes() {
        let analytics = AnalyticsService::default();
        analytics.record_hit("v1:feed:u1:HOME", MS);
        analytics.record_miss("v1:prefs:u1", MS);

        let dashboard = analytics.cache_dashboard_data();
        assert_eq!(dashboard.top_patterns.len(), 2);
        assert_eq!(dashboard.analytics.total_hits, 1);

        let json = serde_json::to_value(&dashboard).unwrap();
        // 0.5 is not above the FAIR threshold
        assert_eq!(json["analytics"]["health"], "POOR");
        assert_eq!(
            json["analytics"]["adaptive_config"]["optimization_interval_secs"],
            900
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let analytics = Arc::new(AnalyticsService::default());
        let token = CancellationToken::new();
        let handle = tokio::spawn(analytics.clone().run(token.clone()));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
