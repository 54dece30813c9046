//! Domain Layer
//!
//! # Architecture
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for the key-value backend,
//!   the cache contract and event listeners
//! - **Events** (`events.rs`) - Domain events and invalidation requests
//!
//! # Usage
//!
//! ```ignore
//! use feedcache::domain::ports::{CacheProvider, CacheProviderExt};
//!
//! async fn cached_feed<P: CacheProvider + ?Sized>(cache: &P, user: &str) -> Option<Vec<String>> {
//!     cache.get_json(&feedcache::cache::key::feed_key(user, FeedType::Home)).await
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{
    ContentPublishedEvent, DomainEvent, InvalidationEvent, PreferencesChangedEvent,
    UserFollowedEvent,
};
pub use ports::{
    CacheEventListener, CacheProvider, CacheProviderExt, CacheStats, EventPublisher, FeedType,
    KeyValueBackend, PreferenceType,
};
