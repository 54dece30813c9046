//! Per-Shard Statistics
//!
//! Lock-free counters for every shard slot of the sharded provider.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for one shard
#[derive(Debug, Default)]
pub struct ShardStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl ShardStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self, shard_index: usize) -> ShardStatsSnapshot {
        ShardStatsSnapshot {
            shard_index,
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            deletes: self.deletes(),
            errors: self.errors(),
            hit_ratio: self.hit_ratio(),
        }
    }
}

/// Point-in-time copy of a shard's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardStatsSnapshot {
    pub shard_index: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = ShardStats::new();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.errors(), 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_tracking() {
        let stats = ShardStats::new();

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert!((stats.hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_snapshot() {
        let stats = ShardStats::new();
        stats.record_write();
        stats.record_deletes(3);
        stats.record_error();

        let snapshot = stats.snapshot(2);
        assert_eq!(snapshot.shard_index, 2);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.deletes, 3);
        assert_eq!(snapshot.errors, 1);
    }
}
