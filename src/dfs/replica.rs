//! A replica node: executes operations locally, then propagates them.
//!
//! Every replica holds a full copy of the tree. A mutating call applies to
//! local storage first; if that succeeds and the call came from a client
//! (`propagate == true`), the same operation is re-applied on every peer
//! with `propagate == false`. The local mutation is committed regardless of
//! how propagation goes: there is no rollback and no reconciliation, only
//! detection of divergence.

use std::io;
use std::sync::{Arc, OnceLock};

use log::{error, info, warn};

use crate::net::Registry;
use crate::store::LocalStore;

use super::errors::OpFault;
use super::handle::ReplicaHandle;
use super::message::{ReplicaRequest, ReplicaResponse};
use super::path::sibling;
use super::replica_name;

/// One node of the replicated filesystem.
pub struct ReplicaNode {
    replica_id: u32,
    store: LocalStore,
    registry: Arc<Registry>,
    /// Peer handles in increasing id order, self excluded. Populated once
    /// by `connect_peers`; until then every propagation fails fast.
    peers: OnceLock<Vec<ReplicaHandle>>,
}

impl ReplicaNode {
    pub fn new(replica_id: u32, store: LocalStore, registry: Arc<Registry>) -> Self {
        ReplicaNode {
            replica_id,
            store,
            registry,
            peers: OnceLock::new(),
        }
    }

    /// Learn the peer list: look up every other replica of the
    /// `replica_count`-node system. Idempotent once it has succeeded.
    ///
    /// Any lookup failure leaves the node unconnected; a partial peer list
    /// is never installed.
    pub fn connect_peers(&self, replica_count: u32) -> Result<(), OpFault> {
        if self.peers.get().is_some() {
            return Ok(());
        }
        if replica_count == 0 {
            return Err(OpFault::InvalidArgument {
                detail: "replica count must be at least 1".into(),
            });
        }

        let mut peers = Vec::with_capacity(replica_count.saturating_sub(1) as usize);
        for id in 0..replica_count {
            if id == self.replica_id {
                continue;
            }
            let handle = self
                .registry
                .lookup(&replica_name(id))
                .map_err(|_| OpFault::PeerLookup { replica_id: id })?;
            peers.push(ReplicaHandle::new(id, handle));
        }

        let _ = self.peers.set(peers);
        info!(
            "replica {}: connected to {} peers",
            self.replica_id,
            replica_count - 1
        );
        Ok(())
    }

    pub fn create_file(&self, path: &str, propagate: bool) -> Result<(), OpFault> {
        self.store
            .create_file(path)
            .map_err(|e| map_io(path, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::CreateFile {
                path: path.to_string(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// Write `content` to a file, creating it if it does not exist yet.
    pub fn write_file(&self, path: &str, content: &[u8], propagate: bool) -> Result<(), OpFault> {
        self.store
            .write_file(path, content)
            .map_err(|e| map_io(path, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::WriteFile {
                path: path.to_string(),
                content: content.to_vec(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// Read a file. Never propagates, never mutates.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, OpFault> {
        self.store.read_file(path).map_err(|e| map_io(path, e))
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, path: &str, propagate: bool) -> Result<(), OpFault> {
        self.store.remove(path).map_err(|e| map_io(path, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::Remove {
                path: path.to_string(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// Move a file (never a directory) to a target that must not exist yet.
    pub fn move_file(&self, source: &str, target: &str, propagate: bool) -> Result<(), OpFault> {
        if self.store.is_directory(target) {
            return Err(OpFault::InvalidArgument {
                detail: "cannot move a directory".into(),
            });
        }
        if self.store.exists(target) {
            return Err(OpFault::AlreadyExists {
                path: target.to_string(),
            });
        }
        self.store
            .rename(source, target)
            .map_err(|e| map_io(source, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::MoveFile {
                source: source.to_string(),
                target: target.to_string(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// Rename a file (never a directory) in place.
    pub fn rename_file(&self, path: &str, new_name: &str, propagate: bool) -> Result<(), OpFault> {
        if self.store.is_directory(path) {
            return Err(OpFault::InvalidArgument {
                detail: "cannot rename a directory".into(),
            });
        }
        if !new_name.contains('.') {
            return Err(OpFault::InvalidArgument {
                detail: "renamed file must carry an extension".into(),
            });
        }
        let target = sibling(path, new_name);
        if self.store.exists(&target) {
            return Err(OpFault::AlreadyExists { path: target });
        }
        self.store
            .rename(path, &target)
            .map_err(|e| map_io(path, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::RenameFile {
                path: path.to_string(),
                new_name: new_name.to_string(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// Create a single directory; the parent must exist.
    pub fn create_directory(&self, path: &str, propagate: bool) -> Result<(), OpFault> {
        self.store
            .create_directory(path)
            .map_err(|e| map_io(path, e))?;
        if propagate {
            self.propagate(&ReplicaRequest::CreateDirectory {
                path: path.to_string(),
                propagate: false,
            })?;
        }
        Ok(())
    }

    /// List a directory's entries. Never propagates, never mutates.
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>, OpFault> {
        if !self.store.exists(path) {
            return Err(OpFault::NotFound {
                path: path.to_string(),
            });
        }
        if !self.store.is_directory(path) {
            return Err(OpFault::InvalidArgument {
                detail: format!("`{}` is not a directory", path),
            });
        }
        self.store.list_directory(path).map_err(|e| map_io(path, e))
    }

    /// Re-apply an already-committed local mutation on every peer, in
    /// increasing id order.
    ///
    /// A peer that cannot be reached is presumed down and skipped: it is
    /// expected to catch up out of band (no catch-up mechanism exists). A
    /// peer that answers with any failure has diverged from this node, so
    /// the fan-out stops right there; contacting the remaining peers would
    /// only blur which replicas still agree.
    fn propagate(&self, op: &ReplicaRequest) -> Result<(), OpFault> {
        let Some(peers) = self.peers.get() else {
            return Err(OpFault::NotConnected);
        };

        for peer in peers {
            match peer.call(op) {
                Ok(ReplicaResponse::Done) => {}
                Err(fault) if fault.is_disconnect() => {
                    warn!(
                        "replica {}: peer {} unreachable during propagation, skipping",
                        self.replica_id,
                        peer.replica_id()
                    );
                }
                Ok(ReplicaResponse::Failed { fault }) => {
                    error!(
                        "replica {}: peer {} rejected propagated operation: {}",
                        self.replica_id,
                        peer.replica_id(),
                        fault
                    );
                    return Err(OpFault::Inconsistent {
                        replica_id: peer.replica_id(),
                    });
                }
                Ok(_) | Err(_) => {
                    return Err(OpFault::Inconsistent {
                        replica_id: peer.replica_id(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Translate a local-storage failure into the wire taxonomy.
fn map_io(path: &str, err: io::Error) -> OpFault {
    match err.kind() {
        io::ErrorKind::AlreadyExists => OpFault::AlreadyExists {
            path: path.to_string(),
        },
        io::ErrorKind::NotFound => OpFault::NotFound {
            path: path.to_string(),
        },
        io::ErrorKind::PermissionDenied => OpFault::PermissionDenied {
            path: path.to_string(),
        },
        io::ErrorKind::DirectoryNotEmpty => OpFault::NotEmpty {
            path: path.to_string(),
        },
        _ => OpFault::Io {
            detail: err.to_string(),
        },
    }
}
