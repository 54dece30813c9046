//! Prometheus Exporter
//!
//! Mirrors shard counters, analytics totals and invalidation counters into a
//! private registry. Values are refreshed from the live subsystem on every
//! scrape, so nothing has to push into Prometheus on the hot path.

use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::subsystem::CacheSubsystem;

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

/// Registry of feed cache metrics
pub struct CacheMetricsExporter {
    registry: Registry,

    // Per shard
    shard_hits: IntGaugeVec,
    shard_misses: IntGaugeVec,
    shard_writes: IntGaugeVec,
    shard_deletes: IntGaugeVec,
    shard_errors: IntGaugeVec,
    healthy: IntGauge,

    // Analytics
    hits: IntGauge,
    misses: IntGauge,
    writes: IntGauge,
    evictions: IntGauge,
    hit_rate: Gauge,
    eviction_rate: Gauge,
    tracked_keys: IntGauge,
    tracked_patterns: IntGauge,
    max_cache_size: IntGauge,
    ttl_multiplier: Gauge,

    // Invalidation
    invalidated_keys: IntGauge,
    skipped_invalidations: IntGauge,
    events_processed: IntGauge,
    event_failures: IntGauge,
}

impl CacheMetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("feedcache".to_string()), None)
            .map_err(metrics_error)?;

        let shard_vec = |name: &str, help: &str| -> Result<IntGaugeVec> {
            let gauge = IntGaugeVec::new(Opts::new(name, help), &["shard"]).map_err(metrics_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
            Ok(gauge)
        };
        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::new(name, help).map_err(metrics_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
            Ok(gauge)
        };
        let float_gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge = Gauge::new(name, help).map_err(metrics_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
            Ok(gauge)
        };

        Ok(Self {
            shard_hits: shard_vec("shard_hits", "Cache hits served per shard")?,
            shard_misses: shard_vec("shard_misses", "Cache misses per shard")?,
            shard_writes: shard_vec("shard_writes", "Successful writes per shard")?,
            shard_deletes: shard_vec("shard_deletes", "Keys deleted per shard")?,
            shard_errors: shard_vec("shard_errors", "Backend errors per shard")?,
            healthy: int_gauge("healthy", "1 if every shard answered the last health check")?,
            hits: int_gauge("analytics_hits", "Hits recorded by analytics")?,
            misses: int_gauge("analytics_misses", "Misses recorded by analytics")?,
            writes: int_gauge("analytics_writes", "Writes recorded by analytics")?,
            evictions: int_gauge("analytics_evictions", "Evictions recorded by analytics")?,
            hit_rate: float_gauge("hit_rate", "Global hit rate")?,
            eviction_rate: float_gauge("eviction_rate", "Evictions per read")?,
            tracked_keys: int_gauge("tracked_keys", "Keys with live metrics")?,
            tracked_patterns: int_gauge("tracked_patterns", "Key patterns with live metrics")?,
            max_cache_size: int_gauge("max_cache_size", "Adaptive capacity target")?,
            ttl_multiplier: float_gauge("ttl_multiplier", "Adaptive global TTL multiplier")?,
            invalidated_keys: int_gauge("invalidated_keys", "Keys removed by invalidation")?,
            skipped_invalidations: int_gauge(
                "invalidations_skipped",
                "Invalidations suppressed by the dedup window",
            )?,
            events_processed: int_gauge(
                "invalidation_events_processed",
                "Queued invalidation events completed",
            )?,
            event_failures: int_gauge(
                "invalidation_event_failures",
                "Queued invalidation events that panicked",
            )?,
            registry,
        })
    }

    /// Copy current values out of the subsystem.
    pub fn refresh(&self, subsystem: &CacheSubsystem) {
        let sharded = subsystem.sharded();
        for snapshot in sharded.all_shard_stats() {
            let shard = snapshot.shard_index.to_string();
            let labels = [shard.as_str()];
            self.shard_hits.with_label_values(&labels).set(snapshot.hits as i64);
            self.shard_misses.with_label_values(&labels).set(snapshot.misses as i64);
            self.shard_writes.with_label_values(&labels).set(snapshot.writes as i64);
            self.shard_deletes.with_label_values(&labels).set(snapshot.deletes as i64);
            self.shard_errors.with_label_values(&labels).set(snapshot.errors as i64);
        }
        self.healthy.set(i64::from(sharded.is_healthy()));

        let analytics = subsystem.analytics();
        self.hits.set(analytics.total_hits() as i64);
        self.misses.set(analytics.total_misses() as i64);
        self.writes.set(analytics.total_writes() as i64);
        self.evictions.set(analytics.total_evictions() as i64);
        self.hit_rate.set(analytics.global_hit_rate());
        self.eviction_rate.set(analytics.eviction_rate());
        self.tracked_keys.set(analytics.tracked_keys() as i64);
        self.tracked_patterns.set(analytics.tracked_patterns() as i64);
        let adaptive = analytics.adaptive_config();
        self.max_cache_size.set(adaptive.max_cache_size as i64);
        self.ttl_multiplier.set(adaptive.ttl_multiplier);

        let invalidation = subsystem.invalidation().stats();
        self.invalidated_keys.set(invalidation.invalidated_keys as i64);
        self.skipped_invalidations
            .set(invalidation.skipped_duplicates as i64);
        self.events_processed.set(invalidation.events_processed as i64);
        self.event_failures.set(invalidation.event_failures as i64);
    }

    /// Refresh and encode in the Prometheus text format.
    pub fn render(&self, subsystem: &CacheSubsystem) -> Result<String> {
        self.refresh(subsystem);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics not UTF-8: {}", e)))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}
