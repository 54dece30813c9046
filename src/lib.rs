//! Feedcache - Sharded, Self-Tuning Feed Cache
//!
//! The caching layer of a content-feed backend: consistent-hash sharding
//! over a remote key-value store, event-driven invalidation and adaptive TTL
//! tuning from observed traffic.
//!
//! # Architecture
//!
//! ```text
//! Domain events ──▶ DomainEventBus ──▶ InvalidationService ──┐
//!                                                             ▼
//! Feed assembly ──▶ ObservedCacheProvider ──▶ ShardedCacheProvider ──▶ Redis shards
//!                          │
//!                          ▼
//!                   AnalyticsService (TTL optimizer, capacity tuning)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Redis and in-memory backends, event publishers
//! - [`analytics`] - Traffic metrics, TTL recommendations, dashboards
//! - [`cache`] - Hash ring, sharded provider, analytics decorator
//! - [`domain`] - Ports and domain events
//! - [`error`] - Error types
//! - [`invalidation`] - Event-driven invalidation flows
//! - [`monitoring`] - Health probes, Prometheus exporter, HTTP server
//! - [`subsystem`] - Wiring and background task lifecycle

pub mod adapters;
pub mod analytics;
pub mod cache;
pub mod domain;
pub mod error;
pub mod invalidation;
pub mod monitoring;
pub mod subsystem;

// Re-export commonly used types
pub use analytics::AnalyticsService;
pub use cache::{ObservedCacheProvider, ShardedCacheProvider};
pub use domain::ports::{CacheProvider, CacheProviderExt, FeedType};
pub use error::{Error, Result};
pub use invalidation::InvalidationService;
pub use subsystem::{CacheSubsystem, CacheSubsystemConfig};
