//! Feedcache Server
//!
//! Runs the cache subsystem against Redis (or in-process shards) and exposes
//! its operational endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         feedcache                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Analytics   │    │ Invalidation │    │   Health     │       │
//! │  │    loop      │    │   consumer   │    │   checks     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │          /healthz  /readyz  /metrics  /cache/dashboard           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedcache::adapters::RedisConfig;
use feedcache::analytics::{AdaptiveCacheConfig, AnalyticsConfig};
use feedcache::cache::ShardingConfig;
use feedcache::monitoring::{serve, CacheMetricsExporter, ServerState};
use feedcache::{CacheSubsystem, CacheSubsystemConfig, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Feedcache - sharded, self-tuning feed cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated Redis URLs, one per shard
    #[arg(long, env = "REDIS_URLS", value_delimiter = ',')]
    redis_urls: Vec<String>,

    /// Use this many in-process shards instead of Redis
    #[arg(long, env = "MEMORY_SHARDS", conflicts_with = "redis_urls")]
    memory_shards: Option<usize>,

    /// Virtual nodes per shard on the hash ring
    #[arg(long, env = "VIRTUAL_NODES", default_value = "150")]
    virtual_nodes: usize,

    /// Pooled connections per Redis shard
    #[arg(long, env = "REDIS_POOL_SIZE", default_value = "16")]
    redis_pool_size: usize,

    /// Redis connection timeout in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value = "500")]
    redis_timeout_ms: u64,

    /// TTL optimization interval in seconds
    #[arg(long, env = "OPTIMIZATION_INTERVAL_SECONDS", default_value = "900")]
    optimization_interval_seconds: u64,

    /// Operational server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting feedcache");
    info!("  Virtual nodes: {}", args.virtual_nodes);
    info!("  Optimization interval: {}s", args.optimization_interval_seconds);
    info!("  Operational server: {}", args.metrics_addr);

    let config = CacheSubsystemConfig {
        sharding: ShardingConfig {
            virtual_nodes: args.virtual_nodes,
        },
        analytics: AnalyticsConfig {
            adaptive: AdaptiveCacheConfig {
                optimization_interval: Duration::from_secs(args.optimization_interval_seconds),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };

    let subsystem = match args.memory_shards {
        Some(shards) => {
            info!("  Backend: {} in-memory shards", shards);
            CacheSubsystem::in_memory(shards, config)?
        }
        None => {
            let redis = RedisConfig {
                urls: if args.redis_urls.is_empty() {
                    RedisConfig::default().urls
                } else {
                    args.redis_urls.clone()
                },
                pool_size: args.redis_pool_size,
                timeout: Duration::from_millis(args.redis_timeout_ms),
            };
            info!("  Backend: {} Redis shards", redis.urls.len());
            CacheSubsystem::with_redis(&redis, config)?
        }
    };
    let subsystem = Arc::new(subsystem);

    for shard in subsystem.sharded().health_check().await {
        if shard.healthy {
            info!(shard = shard.shard_index, backend = %shard.backend, "Shard reachable");
        } else {
            // Fail open: the cache keeps serving misses until the shard returns
            error!(
                shard = shard.shard_index,
                backend = %shard.backend,
                error = shard.error.as_deref().unwrap_or("unknown"),
                "Shard unreachable at startup"
            );
        }
    }

    subsystem.start();

    // Start operational server
    let server_shutdown = CancellationToken::new();
    let state = Arc::new(ServerState {
        subsystem: subsystem.clone(),
        exporter: CacheMetricsExporter::new()?,
    });
    let addr = args.metrics_addr.clone();
    let server = tokio::spawn({
        let token = server_shutdown.clone();
        async move {
            if let Err(e) = serve(&addr, state, token).await {
                error!("Operational server error: {}", e);
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server_shutdown.cancel();
    subsystem.shutdown().await;
    if let Err(e) = server.await {
        error!("Operational server task failed: {}", e);
    }

    info!("Feedcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info", "deadpool=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
