//! Replica selection: uniform random over currently-reachable replicas.
//!
//! Liveness is discovered lazily, per call, by probing: completion of the
//! probe is the "alive" signal, failure to complete is the "down" signal.
//! Ids proven down during one selection are kept in an excluded set and the
//! draw repeats over the complement until a probe completes or every id has
//! failed. Nothing is cached across calls, and there is no affinity or load
//! weighting.

use rand::Rng;

use super::errors::OpFault;

/// Maximum supported replica count (bitset bound).
pub const MAX_REPLICAS: u32 = 64;

/// Compact set of replica ids, one bit per id.
#[derive(Clone, Copy, Default)]
pub struct ReplicaSet(u64);

impl ReplicaSet {
    pub fn new() -> Self {
        ReplicaSet(0)
    }

    pub fn insert(&mut self, replica_id: u32) {
        debug_assert!(replica_id < MAX_REPLICAS, "replica_id exceeds MAX_REPLICAS");
        self.0 |= 1u64 << replica_id;
    }

    pub fn contains(&self, replica_id: u32) -> bool {
        debug_assert!(replica_id < MAX_REPLICAS, "replica_id exceeds MAX_REPLICAS");
        (self.0 & (1u64 << replica_id)) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

/// Pick a reachable replica id in `[0, replica_count)`.
///
/// `probe` must return true iff the liveness call to that id completed.
/// Each id is probed at most once per selection.
pub fn pick_replica<F>(replica_count: u32, mut probe: F) -> Result<u32, OpFault>
where
    F: FnMut(u32) -> bool,
{
    assert!(
        replica_count >= 1 && replica_count <= MAX_REPLICAS,
        "replica_count {} out of range [1, {}]",
        replica_count,
        MAX_REPLICAS
    );

    let mut rng = rand::thread_rng();
    let mut failed = ReplicaSet::new();
    let mut id = rng.gen_range(0..replica_count);

    loop {
        if probe(id) {
            return Ok(id);
        }
        failed.insert(id);
        if failed.count() == replica_count {
            return Err(OpFault::NoReplicaReachable);
        }
        // Redraw uniformly among the ids not yet proven down.
        while failed.contains(id) {
            id = rng.gen_range(0..replica_count);
        }
    }
}
