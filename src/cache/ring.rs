//! Consistent Hash Ring
//!
//! Maps keys to shard indices using virtual nodes on a CRC32 ring.
//!
//! # Design
//!
//! - Each physical shard owns `virtual_nodes` positions, hashed from
//!   `"{shard}:{vnode}"`
//! - A key belongs to the first position whose hash is `>=` the key's hash,
//!   wrapping to the lowest position
//! - Built once and never mutated, so lookups need no locking

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Default number of virtual nodes per physical shard.
pub const DEFAULT_VIRTUAL_NODES: usize = 150;

/// 32-bit ring hash of a UTF-8 string.
#[inline]
pub fn ring_hash(value: &str) -> u32 {
    crc32fast::hash(value.as_bytes())
}

/// Immutable consistent hash ring.
#[derive(Debug, Clone)]
pub struct HashRing {
    ring: BTreeMap<u32, usize>,
    shard_count: usize,
    virtual_nodes: usize,
}

impl HashRing {
    /// Build a ring for `shard_count` shards.
    ///
    /// Fails when there is nothing to route to.
    pub fn new(shard_count: usize, virtual_nodes: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(Error::NoShards);
        }
        if virtual_nodes == 0 {
            return Err(Error::Config(
                "virtual node count must be at least 1".to_string(),
            ));
        }

        let mut ring = BTreeMap::new();
        for shard in 0..shard_count {
            for vnode in 0..virtual_nodes {
                // Later nodes win hash collisions
                ring.insert(ring_hash(&format!("{}:{}", shard, vnode)), shard);
            }
        }

        Ok(Self {
            ring,
            shard_count,
            virtual_nodes,
        })
    }

    /// Owning shard index for a key.
    pub fn shard_for(&self, key: &str) -> usize {
        self.shard_for_hash(ring_hash(key))
    }

    fn shard_for_hash(&self, hash: u32) -> usize {
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, shard)| *shard)
            // The constructor rejects empty rings
            .unwrap_or(0)
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }

    /// Number of positions on the ring (less than `shards * vnodes` only on collisions).
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Count how many of `keys` land on each shard.
    pub fn distribution<'a, I>(&self, keys: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = vec![0usize; self.shard_count];
        for key in keys {
            counts[self.shard_for(key)] += 1;
        }
        counts
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_requires_shards() {
        assert!(matches!(HashRing::new(0, 150), Err(Error::NoShards)));
        assert!(HashRing::new(1, 0).is_err());
    }

    #[test]
    fn test_ring_size() {
        let ring = HashRing::new(4, DEFAULT_VIRTUAL_NODES).unwrap();
        assert_eq!(ring.shard_count(), 4);
        assert_eq!(ring.virtual_nodes(), 150);
        // CRC32 collisions among 600 short strings are possible but rare
        assert!(ring.len() > 590 && ring.len() <= 600);
    }

    #[test]
    fn test_single_shard_owns_everything() {
        let ring = HashRing::new(1, DEFAULT_VIRTUAL_NODES).unwrap();
        for i in 0..100 {
            assert_eq!(ring.shard_for(&format!("key-{}", i)), 0);
        }
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring = HashRing::new(4, DEFAULT_VIRTUAL_NODES).unwrap();
        let rebuilt = HashRing::new(4, DEFAULT_VIRTUAL_NODES).unwrap();

        for i in 0..1000 {
            let key = format!("v1:feed:user{}:HOME", i);
            let first = ring.shard_for(&key);
            assert_eq!(ring.shard_for(&key), first);
            assert_eq!(rebuilt.shard_for(&key), first);
        }
    }

    #[test]
    fn test_wraps_past_highest_node() {
        let ring = HashRing::new(3, 10).unwrap();
        let (_, lowest_shard) = ring.ring.iter().next().unwrap();
        let (highest_hash, _) = ring.ring.iter().next_back().unwrap();

        if *highest_hash < u32::MAX {
            assert_eq!(ring.shard_for_hash(highest_hash + 1), *lowest_shard);
        }
    }

    #[test]
    fn test_exact_node_hash_maps_to_that_node() {
        let ring = HashRing::new(3, 10).unwrap();
        for (hash, shard) in ring.ring.iter() {
            assert_eq!(ring.shard_for_hash(*hash), *shard);
        }
    }

    #[test]
    fn test_distribution_balance() {
        let ring = HashRing::new(4, DEFAULT_VIRTUAL_NODES).unwrap();
        let keys: Vec<String> = (0..10_000)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let counts = ring.distribution(keys.iter().map(String::as_str));
        let average = 10_000 / 4;

        assert_eq!(counts.iter().sum::<usize>(), 10_000);
        for (shard, count) in counts.iter().enumerate() {
            assert!(
                *count < 2 * average,
                "Uneven distribution: shard {} has {} keys",
                shard,
                count
            );
            assert!(*count > 0, "shard {} received no keys", shard);
        }
    }

    #[test]
    fn test_adding_shard_moves_minority_of_keys() {
        let before = HashRing::new(4, DEFAULT_VIRTUAL_NODES).unwrap();
        let after = HashRing::new(5, DEFAULT_VIRTUAL_NODES).unwrap();

        let moved = (0..10_000)
            .map(|i| format!("key-{}", i))
            .filter(|k| before.shard_for(k) != after.shard_for(k))
            .count();

        // Ideal movement is 1/5 of keys; modulo hashing would move ~4/5
        assert!(moved < 4_000, "{} keys moved", moved);
    }
}
