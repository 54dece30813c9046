//! Operational Monitoring
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Operational Server                        │
//! │   /healthz  /readyz  /metrics  /cache/dashboard               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌──────────────────┐  ┌──────────────┐  │
//! │  │ Health         │  │ Prometheus       │  │ Dashboard    │  │
//! │  │ (shard pings)  │  │ (refresh/scrape) │  │ (analytics)  │  │
//! │  └────────────────┘  └──────────────────┘  └──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod exporter;
pub mod health;
pub mod server;

pub use exporter::CacheMetricsExporter;
pub use health::{HealthCheckResult, HealthResponse, HealthStatus, ProbeState};
pub use server::{serve, ServerState};
