//! Sharded Feed Cache
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            ObservedCacheProvider              │  analytics decorator
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │            ShardedCacheProvider               │
//! │   HashRing (CRC32, 150 vnodes/shard)          │
//! │   ShardStats per shard                        │
//! └──────┬───────────────┬───────────────┬───────┘
//!        ▼               ▼               ▼
//!   KeyValueBackend KeyValueBackend KeyValueBackend
//!   (Redis / memory)
//! ```
//!
//! - [`key`]: key namespaces and pattern helpers
//! - [`ring`]: consistent hash ring
//! - [`sharded`]: routing, fallback and fan-out
//! - [`observed`]: traffic recording

pub mod key;
pub mod observed;
pub mod ring;
pub mod sharded;
pub mod stats;

pub use observed::ObservedCacheProvider;
pub use ring::{HashRing, DEFAULT_VIRTUAL_NODES};
pub use sharded::{RebalanceResult, ShardHealth, ShardedCacheProvider, ShardingConfig};
pub use stats::{ShardStats, ShardStatsSnapshot};
