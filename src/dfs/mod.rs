//! The coordination and replication protocol.
//!
//! Three roles cooperate around every filesystem operation:
//! - the coordinator grants per-path access through a reader/writer lock
//!   table and names a live replica to serve the call;
//! - the chosen replica applies the operation locally and re-applies every
//!   mutation on its peers;
//! - the client session drives the two-phase start / do / end protocol and
//!   releases its locks on every failure path.
//!
//! # Invariants
//!
//! 1. **Lock exclusivity**: a path is never write-locked while readers are
//!    outstanding, and vice versa.
//! 2. **Balanced starts**: every successful start-operation is matched by
//!    exactly one end-operation, on every outcome.
//! 3. **Local commit first**: a replica reports success only after its own
//!    mutation succeeded; propagation never rolls it back.
//! 4. **Divergence stops the fan-out**: a reachable peer rejecting a
//!    propagated mutation aborts propagation immediately and is fatal.

pub mod client;
pub mod coordinator;
pub mod errors;
pub mod handle;
pub mod locks;
pub mod message;
pub mod path;
pub mod replica;
pub mod select;
pub mod server;

#[cfg(test)]
mod tests;

/// Registry name of the coordinator service.
pub const COORDINATOR_NAME: &str = "coordinator";

/// Registry name of a replica service.
pub fn replica_name(replica_id: u32) -> String {
    format!("replica-{}", replica_id)
}
