//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │       KeyValueBackend │ EventPublisher                      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ RedisBackend │ InMemoryBackend                              │ │
//! │  │ DomainEventBus                                              │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use feedcache::adapters::{RedisBackend, RedisConfig};
//!
//! let shards = RedisBackend::connect_all(&RedisConfig::default())?;
//! ```

mod event_publisher;
mod memory;
mod redis;

pub use self::redis::{RedisBackend, RedisConfig};
pub use event_publisher::DomainEventBus;
pub use memory::InMemoryBackend;
