//! Health Checks
//!
//! Liveness and readiness probes for the cache process, built from per-shard
//! ping results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::sharded::ShardHealth;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Every shard answers
    Healthy,
    /// Some shards are down; reads fail over or miss
    Degraded,
    /// No shard answers; every read is a miss
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Result of a single named check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl HealthCheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// Set duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// One check per shard, named `shard-{index}`
    pub fn from_shard(shard: &ShardHealth) -> Self {
        let name = format!("shard-{}", shard.shard_index);
        let result = if shard.healthy {
            Self::healthy(name)
        } else {
            Self::unhealthy(
                name,
                shard
                    .error
                    .clone()
                    .unwrap_or_else(|| "ping failed".to_string()),
            )
        };
        result.with_duration(Duration::from_millis(shard.latency_ms))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthResponse {
    /// Aggregate shard checks: all up is healthy, none up is unhealthy,
    /// anything in between is degraded.
    pub fn from_checks(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let worst = checks
            .iter()
            .map(|c| c.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);
        let any_up = checks.iter().any(|c| c.status.is_operational());
        let status = match worst {
            HealthStatus::Unhealthy if any_up => HealthStatus::Degraded,
            other => other,
        };

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Process probe state
pub struct ProbeState {
    start_time: Instant,
    live: AtomicBool,
    /// Set once background tasks are running
    ready: AtomicBool,
}

impl ProbeState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Build the readiness response from fresh shard results.
    pub fn readiness(&self, shards: &[ShardHealth]) -> HealthResponse {
        let mut checks: Vec<HealthCheckResult> =
            shards.iter().map(HealthCheckResult::from_shard).collect();
        if !self.is_ready() {
            checks.push(HealthCheckResult::unhealthy(
                "subsystem",
                "background tasks not started",
            ));
        }

        let mut response = HealthResponse::from_checks(checks, self.uptime());
        if !self.is_ready() {
            response.status = HealthStatus::Unhealthy;
        }
        response
    }
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
