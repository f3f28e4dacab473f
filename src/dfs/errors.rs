//! Failure taxonomy, split in two layers.
//!
//! `OpFault` is the wire-level kind: it crosses the transport inside
//! response messages, so every remote call's outcome can be classified by
//! the caller before it decides to continue, retry, or abort. `DfsError` is
//! what a client session surfaces to the user, with the fatal/retryable
//! classification attached.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::replica_name;

/// Failure kinds reported across the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum OpFault {
    #[error("path `{path}` is locked by another session, retry")]
    Contention { path: String },
    #[error("no replica is reachable")]
    NoReplicaReachable,
    #[error("`{path}` already exists")]
    AlreadyExists { path: String },
    #[error("`{path}` does not exist")]
    NotFound { path: String },
    #[error("directory `{path}` is not empty")]
    NotEmpty { path: String },
    #[error("permission denied on `{path}`")]
    PermissionDenied { path: String },
    #[error("i/o failure: {detail}")]
    Io { detail: String },
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },
    #[error("replica is not yet connected to its peers")]
    NotConnected,
    #[error("replica {replica_id} is reachable but diverged")]
    Inconsistent { replica_id: u32 },
    #[error("no lock entry for `{path}`")]
    NoSuchLock { path: String },
    #[error("cannot look up peer replica {replica_id}")]
    PeerLookup { replica_id: u32 },
}

/// Errors surfaced by a client session.
///
/// `is_fatal` answers whether the process must stop (state unknown or
/// replicas provably diverged); `is_retryable` marks the two conditions a
/// user fixes by simply re-issuing the command.
#[derive(Debug, Error)]
pub enum DfsError {
    #[error("path `{path}` is locked by another session, retry")]
    Contention { path: String },
    #[error("cannot reach the coordinator")]
    CoordinatorUnreachable,
    #[error("replica {replica_id} went down mid-operation, retry")]
    ReplicaUnreachable { replica_id: u32 },
    #[error("no replica is reachable")]
    NoReplicaReachable,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("`{path}` already exists")]
    AlreadyExists { path: String },
    #[error("`{path}` does not exist")]
    NotFound { path: String },
    #[error("directory `{path}` is not empty")]
    NotEmpty { path: String },
    #[error("permission denied on `{path}`")]
    PermissionDenied { path: String },
    #[error("i/o failure: {detail}")]
    Io { detail: String },
    #[error("replica {replica_id} is reachable but diverged; replicas are inconsistent")]
    Inconsistent { replica_id: u32 },
    #[error("replica is not yet connected to its peers")]
    NotConnected,
    #[error("lock release failed for `{path}`")]
    LockProtocol { path: String },
    #[error("cannot look up `{name}`")]
    Lookup { name: String },
    #[error("configuration error: {detail}")]
    Config { detail: String },
    #[error("protocol violation: {detail}")]
    Protocol { detail: String },
}

impl DfsError {
    /// Whether the whole process must terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DfsError::CoordinatorUnreachable
                | DfsError::NoReplicaReachable
                | DfsError::Inconsistent { .. }
                | DfsError::LockProtocol { .. }
                | DfsError::Lookup { .. }
                | DfsError::Config { .. }
                | DfsError::Protocol { .. }
        )
    }

    /// Whether re-issuing the same command is expected to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DfsError::Contention { .. } | DfsError::ReplicaUnreachable { .. }
        )
    }

    /// Lift a wire-level fault into the client-facing taxonomy.
    pub fn from_fault(fault: OpFault) -> Self {
        match fault {
            OpFault::Contention { path } => DfsError::Contention { path },
            OpFault::NoReplicaReachable => DfsError::NoReplicaReachable,
            OpFault::AlreadyExists { path } => DfsError::AlreadyExists { path },
            OpFault::NotFound { path } => DfsError::NotFound { path },
            OpFault::NotEmpty { path } => DfsError::NotEmpty { path },
            OpFault::PermissionDenied { path } => DfsError::PermissionDenied { path },
            OpFault::Io { detail } => DfsError::Io { detail },
            OpFault::InvalidArgument { detail } => DfsError::InvalidPath(detail),
            OpFault::NotConnected => DfsError::NotConnected,
            OpFault::Inconsistent { replica_id } => DfsError::Inconsistent { replica_id },
            OpFault::NoSuchLock { path } => DfsError::LockProtocol { path },
            OpFault::PeerLookup { replica_id } => DfsError::Lookup {
                name: replica_name(replica_id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_classification() {
        assert!(DfsError::CoordinatorUnreachable.is_fatal());
        assert!(DfsError::NoReplicaReachable.is_fatal());
        assert!(DfsError::Inconsistent { replica_id: 2 }.is_fatal());
        assert!(DfsError::LockProtocol { path: "/a.txt".into() }.is_fatal());

        let contention = DfsError::Contention { path: "/a.txt".into() };
        assert!(!contention.is_fatal());
        assert!(contention.is_retryable());

        let down = DfsError::ReplicaUnreachable { replica_id: 1 };
        assert!(!down.is_fatal());
        assert!(down.is_retryable());

        let invalid = DfsError::InvalidPath("bad".into());
        assert!(!invalid.is_fatal());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_from_fault_keeps_classification() {
        let err = DfsError::from_fault(OpFault::Inconsistent { replica_id: 3 });
        assert!(err.is_fatal());

        let err = DfsError::from_fault(OpFault::Contention { path: "/p/".into() });
        assert!(err.is_retryable());

        let err = DfsError::from_fault(OpFault::PeerLookup { replica_id: 1 });
        assert!(matches!(err, DfsError::Lookup { ref name } if name == "replica-1"));
    }
}
