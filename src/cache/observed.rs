//! Observed Cache Provider
//!
//! Decorates any [`CacheProvider`] and feeds read/write timings into the
//! [`AnalyticsService`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use super::key::extract_pattern;
use crate::analytics::AnalyticsService;
use crate::domain::ports::{CacheProvider, CacheStats};

/// Cache provider that records traffic for analytics
pub struct ObservedCacheProvider {
    inner: Arc<dyn CacheProvider>,
    analytics: Arc<AnalyticsService>,
}

impl ObservedCacheProvider {
    pub fn new(inner: Arc<dyn CacheProvider>, analytics: Arc<AnalyticsService>) -> Self {
        Self { inner, analytics }
    }

    pub fn inner(&self) -> &Arc<dyn CacheProvider> {
        &self.inner
    }

    pub fn analytics(&self) -> &Arc<AnalyticsService> {
        &self.analytics
    }

    /// TTL the optimizer currently recommends for `key`.
    pub fn optimal_ttl(&self, key: &str, default_ttl: Duration) -> Duration {
        self.analytics
            .get_optimal_ttl(&extract_pattern(key), default_ttl)
    }

    /// Store with the TTL recommended for the key's pattern.
    pub async fn set_adaptive(&self, key: &str, value: Bytes, default_ttl: Duration) -> Duration {
        let ttl = self.optimal_ttl(key, default_ttl);
        self.set(key, value, ttl).await;
        ttl
    }
}

#[async_trait]
impl CacheProvider for ObservedCacheProvider {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let start = Instant::now();
        let value = self.inner.get(key).await;
        let latency = start.elapsed();
        if value.is_some() {
            self.analytics.record_hit(key, latency);
        } else {
            self.analytics.record_miss(key, latency);
        }
        value
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let size = value.len() as u64;
        let start = Instant::now();
        self.inner.set(key, value, ttl).await;
        self.analytics.record_write(key, size, start.elapsed());
    }

    async fn delete(&self, key: &str) -> bool {
        self.inner.delete(key).await
    }

    async fn delete_all(&self, keys: &[String]) -> u64 {
        self.inner.delete_all(keys).await
    }

    async fn find_keys(&self, pattern: &str) -> Vec<String> {
        self.inner.find_keys(pattern).await
    }

    async fn exists(&self, key: &str) -> bool {
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.inner.expire(key, ttl).await
    }

    async fn get_ttl(&self, key: &str) -> Option<Duration> {
        self.inner.get_ttl(key).await
    }

    async fn increment(&self, key: &str, delta: i64) -> i64 {
        self.inner.increment(key, delta).await
    }

    async fn clear(&self) {
        self.inner.clear().await
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            evictions: self.analytics.total_evictions(),
            ..self.inner.stats()
        }
    }
}
