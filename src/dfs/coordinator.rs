//! The coordinator: per-path access control plus replica selection.

use log::debug;

use crate::net::Registry;

use super::errors::{DfsError, OpFault};
use super::handle::ReplicaHandle;
use super::locks::LockTable;
use super::message::{OpKind, ReplicaRequest, ReplicaResponse};
use super::select::{pick_replica, MAX_REPLICAS};
use super::replica_name;

/// Grants per-path access through the lock table and picks which replica
/// serves each request. Owns the only mutable shared state in the system.
#[derive(Debug)]
pub struct Coordinator {
    locks: LockTable,
    replica_count: u32,
    replicas: Vec<ReplicaHandle>,
}

impl Coordinator {
    /// Look up all `replica_count` replicas and drive peer-learning on each.
    ///
    /// Every replica must be up and resolvable at this point; any failure is
    /// fatal at construction. Peer-learning runs here, not in the replica's
    /// constructor, because a replica may start before its peers exist.
    pub fn new(registry: &Registry, replica_count: u32) -> Result<Self, DfsError> {
        if replica_count < 1 || replica_count > MAX_REPLICAS {
            return Err(DfsError::Config {
                detail: format!(
                    "replica count {} out of range [1, {}]",
                    replica_count, MAX_REPLICAS
                ),
            });
        }

        let mut replicas = Vec::with_capacity(replica_count as usize);
        for id in 0..replica_count {
            let name = replica_name(id);
            let handle = registry
                .lookup(&name)
                .map_err(|_| DfsError::Lookup { name: name.clone() })?;
            replicas.push(ReplicaHandle::new(id, handle));
        }

        for handle in &replicas {
            match handle.call(&ReplicaRequest::ConnectPeers { replica_count }) {
                Ok(ReplicaResponse::Done) => {}
                Ok(ReplicaResponse::Failed { fault }) => return Err(DfsError::from_fault(fault)),
                Ok(other) => {
                    return Err(DfsError::Protocol {
                        detail: format!("unexpected connect-peers reply: {:?}", other),
                    })
                }
                Err(_) => {
                    return Err(DfsError::Lookup {
                        name: replica_name(handle.replica_id()),
                    })
                }
            }
        }

        Ok(Coordinator {
            locks: LockTable::new(),
            replica_count,
            replicas,
        })
    }

    /// Acquire the lock `kind` needs on `path`, then select a replica.
    ///
    /// Lock refusal is contention: non-fatal, the caller tries again later.
    /// Selection exhausting every replica is fatal.
    pub fn start_operation(&self, kind: OpKind, path: &str) -> Result<u32, OpFault> {
        let granted = match kind {
            OpKind::Write => self.locks.acquire_write(path),
            OpKind::Read => self.locks.acquire_read(path),
        };
        if !granted {
            return Err(OpFault::Contention {
                path: path.to_string(),
            });
        }
        debug!(
            "start {:?} on {} ({} paths tracked)",
            kind,
            path,
            self.locks.tracked()
        );
        self.select_replica()
    }

    /// Release the lock taken by the matching `start_operation`.
    ///
    /// Must be called exactly once per successful start, on every outcome of
    /// the operation itself; an unbalanced start permanently starves the
    /// path. Releasing a path with no entry is a protocol violation.
    pub fn end_operation(&self, kind: OpKind, path: &str) -> Result<(), OpFault> {
        let released = match kind {
            OpKind::Write => self.locks.release_write(path),
            OpKind::Read => self.locks.release_read(path),
        };
        if !released {
            return Err(OpFault::NoSuchLock {
                path: path.to_string(),
            });
        }
        debug!(
            "end {:?} on {} ({} paths tracked)",
            kind,
            path,
            self.locks.tracked()
        );
        Ok(())
    }

    /// Number of replicas, fixed at construction.
    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    fn select_replica(&self) -> Result<u32, OpFault> {
        pick_replica(self.replica_count, |id| {
            self.replicas[id as usize].is_alive().is_ok()
        })
    }
}
