//! TTL and Capacity Optimizer
//!
//! Heuristics only. The multiplier table and the capacity hill-climb are
//! tuned by observation, not derived from a cost model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::metrics::PatternMetrics;

/// Reads needed before a pattern gets a recommendation
pub const MIN_SAMPLES: u64 = 100;

/// Reads at which confidence saturates
pub const FULL_CONFIDENCE_SAMPLES: u64 = 300;

pub const MIN_MULTIPLIER: f64 = 0.1;
pub const MAX_MULTIPLIER: f64 = 3.0;

pub const MIN_TTL: Duration = Duration::from_secs(30);
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard ceiling for `max_cache_size`
pub const MAX_CACHE_SIZE: u64 = 1_000_000;

/// Largest single capacity increase
pub const MAX_GROWTH_STEP: u64 = 10_000;

const MAX_TTL_MULTIPLIER: f64 = 2.0;
const MIN_TTL_MULTIPLIER: f64 = 0.5;

/// Multiplier for a pattern's observed hit rate and latency.
pub fn recommend_multiplier(hit_rate: f64, average_latency: Duration) -> f64 {
    let multiplier: f64 = if hit_rate > 0.9 && average_latency < Duration::from_millis(10) {
        // Cheap and well cached; shorter TTLs keep it fresher at no cost
        0.8
    } else if hit_rate > 0.8 {
        1.0
    } else if hit_rate > 0.6 {
        1.5
    } else if hit_rate > 0.4 {
        2.0
    } else {
        2.5
    };
    multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

/// `min(1, samples / 300)`
pub fn confidence(sample_count: u64) -> f64 {
    (sample_count as f64 / FULL_CONFIDENCE_SAMPLES as f64).min(1.0)
}

/// Scale a default TTL, keeping the result within [`MIN_TTL`, `MAX_TTL`].
pub fn apply_multiplier(default_ttl: Duration, multiplier: f64) -> Duration {
    let multiplier = multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
    let secs = default_ttl.as_secs_f64() * multiplier;
    Duration::from_secs_f64(secs.clamp(MIN_TTL.as_secs_f64(), MAX_TTL.as_secs_f64()))
}

/// TTL recommendation for one key pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtlOptimization {
    pub pattern: String,
    pub recommended_multiplier: f64,
    pub sample_count: u64,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

impl TtlOptimization {
    /// Compute a recommendation, or `None` below [`MIN_SAMPLES`].
    pub fn from_metrics(metrics: &PatternMetrics) -> Option<Self> {
        let sample_count = metrics.sample_count();
        if sample_count < MIN_SAMPLES {
            return None;
        }

        Some(Self {
            pattern: metrics.pattern().to_string(),
            recommended_multiplier: recommend_multiplier(
                metrics.calculate_hit_rate(),
                metrics.average_latency(),
            ),
            sample_count,
            confidence: confidence(sample_count),
            last_updated: Utc::now(),
        })
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Global tuning knobs adjusted by the optimizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveCacheConfig {
    pub max_cache_size: u64,
    pub ttl_multiplier: f64,
    pub adaptive_enabled: bool,
    #[serde(rename = "optimization_interval_secs", serialize_with = "serialize_secs")]
    pub optimization_interval: Duration,
}

impl Default for AdaptiveCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 100_000,
            ttl_multiplier: 1.0,
            adaptive_enabled: true,
            optimization_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// What a capacity tuning step changed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CapacityAdjustment {
    Grow {
        max_cache_size: u64,
        ttl_multiplier: f64,
    },
    Relax {
        ttl_multiplier: f64,
    },
    Unchanged,
    Disabled,
}

impl AdaptiveCacheConfig {
    /// One damped hill-climb step.
    ///
    /// Low hit rate with evictions grows capacity and TTLs; a very high hit
    /// rate without evictions relaxes TTLs.
    pub fn tune(&mut self, hit_rate: f64, evictions: u64) -> CapacityAdjustment {
        if !self.adaptive_enabled {
            return CapacityAdjustment::Disabled;
        }

        if hit_rate < 0.7 && evictions > 0 {
            let step = (self.max_cache_size / 5).min(MAX_GROWTH_STEP);
            self.max_cache_size = (self.max_cache_size + step).min(MAX_CACHE_SIZE);
            self.ttl_multiplier = (self.ttl_multiplier * 1.1).min(MAX_TTL_MULTIPLIER);
            CapacityAdjustment::Grow {
                max_cache_size: self.max_cache_size,
                ttl_multiplier: self.ttl_multiplier,
            }
        } else if hit_rate > 0.9 && evictions == 0 {
            self.ttl_multiplier = (self.ttl_multiplier * 0.9).max(MIN_TTL_MULTIPLIER);
            CapacityAdjustment::Relax {
                ttl_multiplier: self.ttl_multiplier,
            }
        } else {
            CapacityAdjustment::Unchanged
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(2);
    const SLOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_multiplier_table() {
        assert_eq!(recommend_multiplier(0.95, FAST), 0.8);
        assert_eq!(recommend_multiplier(0.95, SLOW), 1.0);
        assert_eq!(recommend_multiplier(0.85, FAST), 1.0);
        assert_eq!(recommend_multiplier(0.75, FAST), 1.5);
        assert_eq!(recommend_multiplier(0.5, FAST), 2.0);
        assert_eq!(recommend_multiplier(0.4, FAST), 2.5);
        assert_eq!(recommend_multiplier(0.0, FAST), 2.5);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(confidence(0), 0.0);
        assert_eq!(confidence(150), 0.5);
        assert_eq!(confidence(300), 1.0);
        assert_eq!(confidence(10_000), 1.0);
    }

    #[test]
    fn test_apply_multiplier_clamps() {
        let fifteen_minutes = Duration::from_secs(900);
        assert_eq!(apply_multiplier(fifteen_minutes, 1.5), Duration::from_secs(1350));
        assert_eq!(apply_multiplier(Duration::from_secs(10), 1.0), MIN_TTL);
        assert_eq!(apply_multiplier(Duration::from_secs(48 * 3600), 3.0), MAX_TTL);
        // Out-of-range multipliers are clamped first
        assert_eq!(apply_multiplier(fifteen_minutes, 10.0), Duration::from_secs(2700));
    }

    #[test]
    fn test_optimization_requires_samples() {
        let metrics = PatternMetrics::new("v1:feed:*", 0);
        for i in 0..99 {
            metrics.record_hit(FAST, i);
        }
        assert!(TtlOptimization::from_metrics(&metrics).is_none());

        metrics.record_miss(FAST, 100);
        let optimization = TtlOptimization::from_metrics(&metrics).unwrap();
        assert_eq!(optimization.sample_count, 100);
        assert_eq!(optimization.recommended_multiplier, 0.8);
        assert!((optimization.confidence - 100.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_tune_grow() {
        let mut config = AdaptiveCacheConfig::default();
        let adjustment = config.tune(0.5, 10);
        assert_eq!(
            adjustment,
            CapacityAdjustment::Grow {
                max_cache_size: 110_000,
                ttl_multiplier: 1.1
            }
        );

        // Small caches grow by 20%
        let mut small = AdaptiveCacheConfig {
            max_cache_size: 1_000,
            ..Default::default()
        };
        small.tune(0.5, 1);
        assert_eq!(small.max_cache_size, 1_200);
    }

    #[test]
    fn test_tune_caps() {
        let mut config = AdaptiveCacheConfig {
            max_cache_size: MAX_CACHE_SIZE - 1,
            ttl_multiplier: 1.95,
            ..Default::default()
        };
        config.tune(0.1, 5);
        assert_eq!(config.max_cache_size, MAX_CACHE_SIZE);
        assert_eq!(config.ttl_multiplier, 2.0);
    }

    #[test]
    fn test_tune_relax_and_floor() {
        let mut config = AdaptiveCacheConfig {
            ttl_multiplier: 0.52,
            ..Default::default()
        };
        assert_eq!(
            config.tune(0.95, 0),
            CapacityAdjustment::Relax { ttl_multiplier: 0.5 }
        );
    }

    #[test]
    fn test_tune_unchanged_and_disabled() {
        let mut config = AdaptiveCacheConfig::default();
        assert_eq!(config.tune(0.8, 3), CapacityAdjustment::Unchanged);
        assert_eq!(config.tune(0.95, 1), CapacityAdjustment::Unchanged);
        assert_eq!(config, AdaptiveCacheConfig::default());

        config.adaptive_enabled = false;
        assert_eq!(config.tune(0.1, 100), CapacityAdjustment::Disabled);
    }
}
