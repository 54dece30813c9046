//! Cache Analytics
//!
//! Traffic statistics and adaptive tuning for the feed cache.
//!
//! # Architecture
//!
//! ```text
//! record_hit / record_miss / record_write / record_eviction
//!        │
//!        ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │ CacheMetricEntry │     │  PatternMetrics  │   (DashMap, atomics)
//! │   (per key)      │     │  (per v1:dom:*)  │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │ every 15 min
//!                                   ▼
//!                    ┌──────────────────────────────┐
//!                    │ TtlOptimization per pattern  │──▶ get_optimal_ttl
//!                    │ AdaptiveCacheConfig (Mutex)  │
//!                    └──────────────────────────────┘
//! ```

pub mod metrics;
pub mod optimizer;
mod proptest;
pub mod service;

pub use metrics::{CacheMetricEntry, PatternMetrics, PatternSnapshot};
pub use optimizer::{AdaptiveCacheConfig, CapacityAdjustment, TtlOptimization};
pub use service::{
    AnalyticsConfig, AnalyticsService, CacheAnalytics, CacheDashboardData, CacheHealth, HotKey,
    OptimizationReport,
};
