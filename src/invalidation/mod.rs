//! Cache Invalidation
//!
//! Maps domain changes (new content, preference edits, follows) onto cache
//! deletes, either called directly, through the [`CacheEventListener`]
//! entry points, or via the internal [`InvalidationEvent`] queue.
//!
//! [`CacheEventListener`]: crate::domain::ports::CacheEventListener
//! [`InvalidationEvent`]: crate::domain::events::InvalidationEvent

pub mod service;

pub use service::{InvalidationConfig, InvalidationService, InvalidationStats};
