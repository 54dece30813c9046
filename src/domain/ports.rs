//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the core abstractions (ports) the cache subsystem
//! depends on. Infrastructure adapters implement these traits to provide
//! concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │ CacheProvider │ KeyValueBackend │ CacheEventListener │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │   RedisBackend │ InMemoryBackend │ DomainEventBus    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::events::{
    ContentPublishedEvent, DomainEvent, PreferencesChangedEvent, UserFollowedEvent,
};
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Feed variants cached per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedType {
    Home,
    Following,
    Trending,
    Personalized,
    Explore,
}

impl FeedType {
    /// The full enumeration, in declaration order.
    pub const ALL: [FeedType; 5] = [
        FeedType::Home,
        FeedType::Following,
        FeedType::Trending,
        FeedType::Personalized,
        FeedType::Explore,
    ];

    /// Key segment for this feed type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Home => "HOME",
            FeedType::Following => "FOLLOWING",
            FeedType::Trending => "TRENDING",
            FeedType::Personalized => "PERSONALIZED",
            FeedType::Explore => "EXPLORE",
        }
    }

    /// True when `types` names every feed type at least once.
    pub fn covers_all(types: &[FeedType]) -> bool {
        FeedType::ALL.iter().all(|t| types.contains(t))
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FeedType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown feed type: {}", s)))
    }
}

/// Kind of user preference that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PreferenceType {
    Interests,
    BlockedUsers,
    ContentTypes,
    Other(String),
}

impl PreferenceType {
    /// Feeds whose contents depend on this preference.
    pub fn affected_feed_types(&self) -> &'static [FeedType] {
        match self {
            PreferenceType::Interests => &[
                FeedType::Home,
                FeedType::Personalized,
                FeedType::Explore,
            ],
            PreferenceType::BlockedUsers => &FeedType::ALL,
            PreferenceType::ContentTypes => &[FeedType::Home, FeedType::Personalized],
            PreferenceType::Other(_) => &[FeedType::Personalized],
        }
    }
}

impl From<String> for PreferenceType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "interests" => PreferenceType::Interests,
            "blocked_users" | "blockedusers" => PreferenceType::BlockedUsers,
            "content_types" | "contenttypes" => PreferenceType::ContentTypes,
            _ => PreferenceType::Other(s),
        }
    }
}

impl From<&str> for PreferenceType {
    fn from(s: &str) -> Self {
        PreferenceType::from(s.to_string())
    }
}

impl From<PreferenceType> for String {
    fn from(p: PreferenceType) -> Self {
        match p {
            PreferenceType::Interests => "interests".to_string(),
            PreferenceType::BlockedUsers => "blocked_users".to_string(),
            PreferenceType::ContentTypes => "content_types".to_string(),
            PreferenceType::Other(s) => s,
        }
    }
}

/// Aggregate statistics reported by a [`CacheProvider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: u64,
    pub memory_usage: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, 0 when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Backend Port
// =============================================================================

/// Port for the remote key-value store.
///
/// Every operation is fallible; callers above the provider boundary never see
/// these errors.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Human readable identity (endpoint, shard label) for logs.
    fn name(&self) -> &str;

    /// `GET key`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// `SET key value [EX seconds]`; `None` stores without expiry.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// `DEL key...`, returning the number of keys removed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// `SCAN MATCH pattern` until the cursor is exhausted.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// `EXISTS key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// `EXPIRE key seconds`
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// `PERSIST key`; false when the key is missing or already persistent.
    async fn persist(&self, key: &str) -> Result<bool>;

    /// `TTL key`; `None` for missing or persistent keys.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// `INCRBY key delta`
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// `FLUSHALL`
    async fn flush_all(&self) -> Result<()>;

    /// `PING`
    async fn ping(&self) -> Result<()>;
}

// =============================================================================
// Cache Provider Port
// =============================================================================

/// The cache contract used by feed assembly and preference lookups.
///
/// Operations never fail: a backend error resolves to `None`, `false`, `0` or
/// an empty collection and is logged by the implementation. A zero `ttl`
/// stores the value without expiry.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration);

    async fn delete(&self, key: &str) -> bool;

    /// Delete many keys, returning how many were removed.
    async fn delete_all(&self, keys: &[String]) -> u64;

    /// All keys matching a glob pattern.
    async fn find_keys(&self, pattern: &str) -> Vec<String>;

    async fn exists(&self, key: &str) -> bool;

    /// Reset a key's time to live. A zero `ttl` removes the expiry.
    async fn expire(&self, key: &str, ttl: Duration) -> bool;

    /// Remaining time to live; `None` when the key is missing or persistent.
    async fn get_ttl(&self, key: &str) -> Option<Duration>;

    /// Increment a counter, returning the new value (0 on failure).
    async fn increment(&self, key: &str, delta: i64) -> i64;

    async fn clear(&self);

    fn stats(&self) -> CacheStats;
}

/// Typed JSON helpers on top of any [`CacheProvider`].
#[async_trait]
pub trait CacheProviderExt: CacheProvider {
    /// Read and decode a JSON value. A value that fails to decode is a miss.
    async fn get_json<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let raw = self.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    /// Encode and store a JSON value. Returns false if encoding failed.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> bool
    where
        T: Serialize + Sync,
    {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.set(key, Bytes::from(bytes), ttl).await;
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache value");
                false
            }
        }
    }
}

impl<P: CacheProvider + ?Sized> CacheProviderExt for P {}

// =============================================================================
// Event Ports
// =============================================================================

/// Listener contract for domain events that affect cached data.
#[async_trait]
pub trait CacheEventListener: Send + Sync {
    async fn on_content_published(&self, event: &ContentPublishedEvent) -> Result<()>;

    async fn on_preferences_changed(&self, event: &PreferencesChangedEvent) -> Result<()>;

    async fn on_user_followed(&self, event: &UserFollowedEvent) -> Result<()>;
}

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}
