//! In-Memory Key-Value Backend
//!
//! A DashMap-backed store with TTL support, used for local runs and tests.
//! Faults can be injected to exercise the provider's fail-open paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::cache::key::glob_match;
use crate::domain::ports::KeyValueBackend;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory backend
pub struct InMemoryBackend {
    name: String,
    storage: DashMap<String, StoredValue>,
    /// Every operation fails, including PING
    unavailable: AtomicBool,
    /// Only DEL fails
    fail_deletes: AtomicBool,
    // Statistics
    reads: AtomicU64,
    writes: AtomicU64,
    delete_calls: AtomicU64,
    scan_calls: AtomicU64,
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: DashMap::new(),
            unavailable: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
            scan_calls: AtomicU64::new(0),
        }
    }

    /// Simulate a full outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Make DEL fail while everything else keeps working.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.storage.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live key exists, bypassing fault injection.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.storage.get(key).is_some_and(|v| !v.is_expired(now))
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of DEL commands received (not keys removed).
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::Relaxed)
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(Error::backend(&self.name, "backend unavailable"))
        } else {
            Ok(())
        }
    }

    /// Live value for a key, dropping it if it has expired.
    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = Instant::now();
        let value = self.storage.get(key).map(|v| v.clone())?;
        if value.is_expired(now) {
            self.storage.remove_if(key, |_, v| v.is_expired(now));
            None
        } else {
            Some(value)
        }
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.live(key).map(|v| v.data))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.check_available()?;
        self.delete_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(Error::backend(&self.name, "DEL rejected"));
        }

        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.storage.remove(k))
            .filter(|(_, v)| !v.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        self.scan_calls.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        Ok(self
            .storage
            .iter()
            .filter(|e| !e.is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        match self.storage.get_mut(key) {
            Some(mut value) if !value.is_expired(now) => {
                value.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        match self.storage.get_mut(key) {
            Some(mut value) if !value.is_expired(now) => Ok(value.expires_at.take().is_some()),
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|v| v.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut entry = self
            .storage
            .entry(key.to_string())
            .or_insert_with(|| StoredValue {
                data: Bytes::from_static(b"0"),
                expires_at: None,
            });
        if entry.is_expired(now) {
            *entry = StoredValue {
                data: Bytes::from_static(b"0"),
                expires_at: None,
            };
        }

        let current: i64 = std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::backend(&self.name, "value is not an integer or out of range")
            })?;
        let updated = current
            .checked_add(delta)
            .ok_or_else(|| Error::backend(&self.name, "increment would overflow"))?;
        entry.data = Bytes::from(updated.to_string());
        Ok(updated)
    }

    async fn flush_all(&self) -> Result<()> {
        self.check_available()?;
        self.storage.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryBackend::new("mem-0");

        backend
            .set("k1", Bytes::from("v1"), None)
            .await
            .unwrap();
        assert_eq!(backend.get("k1").await.unwrap(), Some(Bytes::from("v1")));
        assert!(backend.exists("k1").await.unwrap());

        let removed = backend
            .del(&["k1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.get("k1").await.unwrap(), None);
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = InMemoryBackend::new("mem-0");
        backend
            .set("short", Bytes::from("v"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        backend.set("forever", Bytes::from("v"), None).await.unwrap();

        assert!(backend.ttl("short").await.unwrap().is_some());
        assert_eq!(backend.ttl("forever").await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("short").await.unwrap(), None);
        assert!(backend.contains("forever"));
    }

    #[tokio::test]
    async fn test_expire_existing_key() {
        let backend = InMemoryBackend::new("mem-0");
        backend.set("k", Bytes::from("v"), None).await.unwrap();

        assert!(backend.expire("k", Duration::from_secs(60)).await.unwrap());
        assert!(!backend.expire("missing", Duration::from_secs(60)).await.unwrap());

        let ttl = backend.ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(58));
    }

    #[tokio::test]
    async fn test_persist_clears_expiry() {
        let backend = InMemoryBackend::new("mem-0");
        backend
            .set("k", Bytes::from("v"), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(backend.persist("k").await.unwrap());
        assert_eq!(backend.ttl("k").await.unwrap(), None);
        assert!(backend.contains("k"));

        assert!(!backend.persist("k").await.unwrap());
        assert!(!backend.persist("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_pattern() {
        let backend = InMemoryBackend::new("mem-0");
        for key in ["v1:feed:u1:HOME", "v1:feed:u1:EXPLORE", "v1:feed:u2:HOME"] {
            backend.set(key, Bytes::from("x"), None).await.unwrap();
        }

        let mut keys = backend.scan("v1:feed:u1:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["v1:feed:u1:EXPLORE", "v1:feed:u1:HOME"]);
        assert_eq!(backend.scan("*").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_incr_by() {
        let backend = InMemoryBackend::new("mem-0");
        assert_eq!(backend.incr_by("counter", 5).await.unwrap(), 5);
        assert_eq!(backend.incr_by("counter", -2).await.unwrap(), 3);

        backend.set("text", Bytes::from("abc"), None).await.unwrap();
        assert!(backend.incr_by("text", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let backend = InMemoryBackend::new("mem-0");
        backend.set("k", Bytes::from("v"), None).await.unwrap();

        backend.set_fail_deletes(true);
        assert!(backend.del(&["k".to_string()]).await.is_err());
        assert!(backend.get("k").await.unwrap().is_some());

        backend.set_unavailable(true);
        assert!(backend.get("k").await.is_err());
        assert!(backend.ping().await.is_err());

        backend.set_unavailable(false);
        backend.set_fail_deletes(false);
        assert!(backend.ping().await.is_ok());
        assert_eq!(backend.del(&["k".to_string()]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_all() {
        let backend = InMemoryBackend::new("mem-0");
        for i in 0..10 {
            backend
                .set(&format!("k{}", i), Bytes::from("v"), None)
                .await
                .unwrap();
        }
        assert_eq!(backend.len(), 10);

        backend.flush_all().await.unwrap();
        assert!(backend.is_empty());
    }
}
