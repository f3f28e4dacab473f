//! Wire messages between client, coordinator and replicas.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::OpFault;

/// What kind of lock an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Read,
    Write,
}

/// Requests served by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorRequest {
    /// Acquire the lock for `path` and select a replica to serve the call.
    StartOperation { kind: OpKind, path: String },
    /// Release the lock taken by the matching start.
    EndOperation { kind: OpKind, path: String },
    /// Number of replicas in the system, fixed at coordinator construction.
    ReplicaCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorResponse {
    Started { replica_id: u32 },
    Ended,
    ReplicaCount { count: u32 },
    Failed { fault: OpFault },
}

/// Requests served by a replica node.
///
/// Mutating variants carry `propagate`: true when the call comes from a
/// client (the replica must re-apply the mutation on its peers), false when
/// it is itself a propagated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicaRequest {
    CreateFile { path: String, propagate: bool },
    WriteFile { path: String, content: Vec<u8>, propagate: bool },
    ReadFile { path: String },
    Remove { path: String, propagate: bool },
    MoveFile { source: String, target: String, propagate: bool },
    RenameFile { path: String, new_name: String, propagate: bool },
    CreateDirectory { path: String, propagate: bool },
    ListDirectory { path: String },
    /// Learn the peer list: look up every other replica of an
    /// `replica_count`-node system. Sent once, after all nodes are up.
    ConnectPeers { replica_count: u32 },
    IsAlive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicaResponse {
    Done,
    FileContent { content: Vec<u8> },
    Listing { entries: Vec<String> },
    Alive,
    Failed { fault: OpFault },
}

/// Encode a message for the transport.
pub fn encode<T: Serialize>(msg: &T) -> Vec<u8> {
    bincode::serialize(msg).expect("wire message serialization should not fail")
}

/// Decode a message received from the transport.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
