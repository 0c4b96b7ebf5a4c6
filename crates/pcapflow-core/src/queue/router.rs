//! # Shard Router
//!
//! Picks the physical channel (shard) an item is pushed to.
//!
//! ## Design
//!
//! - `Exclusive` queues have one shard; everything goes to shard 0.
//! - `RoundRobin` queues rotate over their shards with a shared atomic
//!   cursor, ignoring content. Rotation is shared by every producer of the
//!   queue.
//! - `FlowAffine` queues reduce the item's flow hash to a shard. The same
//!   hash always lands on the same shard, so all packets of a flow are
//!   handled by one consumer in producer order. Items without a flow hash go
//!   to shard 0.
//!
//! ## Hash Reduction
//!
//! Uses multiply-high range reduction (`(hash * shards) >> 64`), which takes
//! the top bits of the hash instead of the low bits a modulo would use.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::DispatchPolicy;

/// Maps a 64-bit word into `[0, shards)` without division.
#[inline]
#[must_use]
pub fn fast_range(word: u64, shards: usize) -> usize {
    debug_assert!(shards > 0);
    let wide = u128::from(word).wrapping_mul(shards as u128);
    // High half is < shards, which fits in usize.
    #[allow(clippy::cast_possible_truncation)]
    {
        (wide >> 64) as usize
    }
}

/// Routes items to shards of one queue.
#[derive(Debug)]
pub struct ShardRouter {
    /// Number of shards to route to
    shards: usize,
    /// Dispatch policy of the owning queue
    policy: DispatchPolicy,
    /// Rotation cursor for `RoundRobin`
    cursor: AtomicUsize,
}

impl ShardRouter {
    /// Creates a router.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is 0.
    #[must_use]
    pub fn new(policy: DispatchPolicy, shards: usize) -> Self {
        assert!(shards > 0, "shards must be > 0");
        Self {
            shards,
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of shards.
    #[must_use]
    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Dispatch policy.
    #[must_use]
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Returns the shard for an item with the given flow hash.
    #[inline]
    pub fn route(&self, flow_hash: Option<u64>) -> usize {
        match self.policy {
            DispatchPolicy::Exclusive => 0,
            DispatchPolicy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % self.shards
            }
            DispatchPolicy::FlowAffine => flow_hash.map_or(0, |hash| self.shard_for_hash(hash)),
        }
    }

    /// Shard owning `hash` under flow-affine routing.
    #[inline]
    #[must_use]
    pub fn shard_for_hash(&self, hash: u64) -> usize {
        fast_range(hash, self.shards)
    }
}
