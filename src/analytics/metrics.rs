//! Per-Key and Per-Pattern Metrics
//!
//! Timestamps are epoch milliseconds so idle checks can be driven by an
//! injected clock in tests.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn micros(latency: Duration) -> u64 {
    latency.as_micros().min(u64::MAX as u128) as u64
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// =============================================================================
// Per-Key Metrics
// =============================================================================

/// Traffic observed for one cache key.
///
/// Lives inside a `DashMap` entry, so mutation happens under the map's shard
/// lock and plain integers suffice.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetricEntry {
    pub key: String,
    pub last_updated: i64,
    pub operation_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub total_response_time_us: u64,
    pub estimated_size: u64,
}

impl CacheMetricEntry {
    pub fn new(key: impl Into<String>, now: i64) -> Self {
        Self {
            key: key.into(),
            last_updated: now,
            operation_count: 0,
            hit_count: 0,
            miss_count: 0,
            eviction_count: 0,
            total_response_time_us: 0,
            estimated_size: 0,
        }
    }

    pub fn record_hit(&mut self, latency: Duration, now: i64) {
        self.hit_count += 1;
        self.touch(latency, now);
    }

    pub fn record_miss(&mut self, latency: Duration, now: i64) {
        self.miss_count += 1;
        self.touch(latency, now);
    }

    pub fn record_write(&mut self, size: u64, latency: Duration, now: i64) {
        self.estimated_size = size;
        self.touch(latency, now);
    }

    pub fn record_eviction(&mut self, now: i64) {
        self.eviction_count += 1;
        self.operation_count += 1;
        self.last_updated = now;
    }

    fn touch(&mut self, latency: Duration, now: i64) {
        self.operation_count += 1;
        self.total_response_time_us = self.total_response_time_us.saturating_add(micros(latency));
        self.last_updated = now;
    }

    pub fn hit_rate(&self) -> f64 {
        ratio(self.hit_count, self.miss_count)
    }

    pub fn average_response_time(&self) -> Duration {
        if self.operation_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_response_time_us / self.operation_count)
        }
    }

    /// True when the entry has not been touched for `max_idle`.
    pub fn is_idle(&self, now: i64, max_idle: Duration) -> bool {
        now.saturating_sub(self.last_updated) > max_idle.as_millis() as i64
    }
}

// =============================================================================
// Per-Pattern Metrics
// =============================================================================

/// Aggregated traffic for a key pattern such as `v1:feed:*`.
///
/// Shared behind an `Arc` and updated concurrently without locks.
#[derive(Debug)]
pub struct PatternMetrics {
    pattern: String,
    last_updated: AtomicI64,
    total_operations: AtomicU64,
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    total_response_time_us: AtomicU64,
}

impl PatternMetrics {
    pub fn new(pattern: impl Into<String>, now: i64) -> Self {
        Self {
            pattern: pattern.into(),
            last_updated: AtomicI64::new(now),
            total_operations: AtomicU64::new(0),
            total_hits: AtomicU64::new(0),
            total_misses: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn record_hit(&self, latency: Duration, now: i64) {
        self.total_hits.fetch_add(1, Ordering::Relaxed);
        self.record_operation(latency, now);
    }

    pub fn record_miss(&self, latency: Duration, now: i64) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
        self.record_operation(latency, now);
    }

    /// Writes and evictions count as operations but not as reads.
    pub fn record_operation(&self, latency: Duration, now: i64) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(micros(latency), Ordering::Relaxed);
        self.last_updated.fetch_max(now, Ordering::Relaxed);
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated.load(Ordering::Relaxed)
    }

    /// Reads observed; the optimizer's sample count.
    pub fn sample_count(&self) -> u64 {
        self.total_hits() + self.total_misses()
    }

    /// `hits / (hits + misses)`, 0 with no reads.
    pub fn calculate_hit_rate(&self) -> f64 {
        ratio(self.total_hits(), self.total_misses())
    }

    pub fn average_latency(&self) -> Duration {
        let ops = self.total_operations();
        if ops == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_response_time_us.load(Ordering::Relaxed) / ops)
        }
    }

    pub fn is_idle(&self, now: i64, max_idle: Duration) -> bool {
        now.saturating_sub(self.last_updated()) > max_idle.as_millis() as i64
    }

    pub fn snapshot(&self) -> PatternSnapshot {
        PatternSnapshot {
            pattern: self.pattern.clone(),
            total_operations: self.total_operations(),
            total_hits: self.total_hits(),
            total_misses: self.total_misses(),
            hit_rate: self.calculate_hit_rate(),
            average_latency_ms: self.average_latency().as_secs_f64() * 1000.0,
            last_updated: self.last_updated(),
        }
    }
}

/// Serializable copy of [`PatternMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSnapshot {
    pub pattern: String,
    pub total_operations: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub average_latency_ms: f64,
    pub last_updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_entry_counts() {
        let mut entry = CacheMetricEntry::new("v1:feed:u1:HOME", 0);
        entry.record_hit(MS * 2, 10);
        entry.record_miss(MS * 4, 20);
        entry.record_write(512, MS * 6, 30);
        entry.record_eviction(40);

        assert_eq!(entry.operation_count, 4);
        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.miss_count, 1);
        assert_eq!(entry.eviction_count, 1);
        assert_eq!(entry.estimated_size, 512);
        assert_eq!(entry.last_updated, 40);
        assert_eq!(entry.hit_rate(), 0.5);
        assert_eq!(entry.average_response_time(), Duration::from_micros(3000));
    }

    #[test]
    fn test_entry_idle() {
        let entry = CacheMetricEntry::new("k", 1_000);
        let hour = Duration::from_secs(3600);
        assert!(!entry.is_idle(1_000 + 3_600_000, hour));
        assert!(entry.is_idle(1_000 + 3_600_001, hour));
    }

    #[test]
    fn test_pattern_hit_rate_monotonic() {
        let metrics = PatternMetrics::new("v1:feed:*", 0);
        assert_eq!(metrics.calculate_hit_rate(), 0.0);

        for i in 0..50 {
            metrics.record_hit(MS, i);
        }
        assert_eq!(metrics.calculate_hit_rate(), 1.0);

        let mut previous = metrics.calculate_hit_rate();
        for i in 0..5 {
            metrics.record_miss(MS, 100 + i);
            let current = metrics.calculate_hit_rate();
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn test_pattern_sample_count_excludes_writes() {
        let metrics = PatternMetrics::new("v1:feed:*", 0);
        metrics.record_hit(MS, 1);
        metrics.record_miss(MS, 2);
        metrics.record_operation(MS, 3);

        assert_eq!(metrics.sample_count(), 2);
        assert_eq!(metrics.total_operations(), 3);
        assert_eq!(metrics.average_latency(), MS);
    }

    #[test]
    fn test_last_updated_never_goes_backwards() {
        let metrics = PatternMetrics::new("p", 100);
        metrics.record_hit(MS, 50);
        assert_eq!(metrics.last_updated(), 100);
        metrics.record_hit(MS, 200);
        assert_eq!(metrics.last_updated(), 200);
    }

    #[test]
    fn test_snapshot() {
        let metrics = PatternMetrics::new("v1:prefs:*", 0);
        metrics.record_hit(MS * 10, 5);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pattern, "v1:prefs:*");
        assert_eq!(snapshot.total_hits, 1);
        assert!((snapshot.average_latency_ms - 10.0).abs() < 1e-9);
    }
}
