//! Property-Based Tests for Analytics and Routing
//!
//! # Test Properties
//!
//! 1. **TTL Clamp**: optimal TTLs always land in [30s, 24h]
//! 2. **Hit-Rate Monotonicity**: all hits give 1.0, each miss lowers the rate
//! 3. **Ring Determinism**: routing is pure across rebuilds

#![cfg(test)]

use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;

use super::metrics::PatternMetrics;
use super::optimizer::{apply_multiplier, TtlOptimization, MAX_TTL, MIN_TTL};
use super::service::AnalyticsService;
use crate::cache::ring::{HashRing, DEFAULT_VIRTUAL_NODES};

// =============================================================================
// Property Strategies
// =============================================================================

fn multiplier_strategy() -> impl Strategy<Value = f64> {
    0.1f64..=3.0
}

/// Default TTLs between one second and two days, in milliseconds.
fn default_ttl_strategy() -> impl Strategy<Value = Duration> {
    (1_000u64..=48 * 3_600_000).prop_map(Duration::from_millis)
}

fn key_strategy() -> impl Strategy<Value = String> {
    "v1:[a-z_]{1,12}:[a-z0-9]{1,16}(:[A-Z]{1,12})?"
}

// =============================================================================
// TTL Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_apply_multiplier_within_bounds(
        default_ttl in default_ttl_strategy(),
        multiplier in multiplier_strategy(),
    ) {
        let ttl = apply_multiplier(default_ttl, multiplier);
        prop_assert!(ttl >= MIN_TTL, "{:?} below floor", ttl);
        prop_assert!(ttl <= MAX_TTL, "{:?} above ceiling", ttl);
    }

    #[test]
    fn prop_optimal_ttl_within_bounds(
        default_ttl in default_ttl_strategy(),
        multiplier in multiplier_strategy(),
        samples in 100u64..10_000,
    ) {
        let analytics = AnalyticsService::default();
        analytics.insert_optimization(TtlOptimization {
            pattern: "v1:feed:*".to_string(),
            recommended_multiplier: multiplier,
            sample_count: samples,
            confidence: 1.0,
            last_updated: Utc::now(),
        });

        let ttl = analytics.get_optimal_ttl("v1:feed:*", default_ttl);
        prop_assert!(ttl >= MIN_TTL && ttl <= MAX_TTL);
    }
}

// =============================================================================
// Hit-Rate Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_hit_rate_monotonic(hits in 1u64..500, misses in 1u64..50) {
        let metrics = PatternMetrics::new("v1:feed:*", 0);
        for i in 0..hits {
            metrics.record_hit(Duration::from_millis(1), i as i64);
        }
        prop_assert_eq!(metrics.calculate_hit_rate(), 1.0);

        let mut previous = 1.0;
        for i in 0..misses {
            metrics.record_miss(Duration::from_millis(1), (hits + i) as i64);
            let current = metrics.calculate_hit_rate();
            prop_assert!(current < previous);
            previous = current;
        }
    }
}

// =============================================================================
// Routing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ring_is_deterministic(
        shards in 1usize..=8,
        keys in prop::collection::vec(key_strategy(), 1..50),
    ) {
        let ring = HashRing::new(shards, DEFAULT_VIRTUAL_NODES).unwrap();
        let rebuilt = HashRing::new(shards, DEFAULT_VIRTUAL_NODES).unwrap();

        for key in &keys {
            let owner = ring.shard_for(key);
            prop_assert!(owner < shards);
            prop_assert_eq!(owner, ring.shard_for(key));
            prop_assert_eq!(owner, rebuilt.shard_for(key));
        }
    }
}
