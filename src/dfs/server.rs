//! Service loops and cluster bootstrap.
//!
//! Each bound service runs a loop thread that drains request frames and
//! hands every frame to its own worker thread: one call, one unit of
//! concurrent work. The loop ends when the binding's last sender is gone.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use log::info;

use crate::net::{Registry, RpcFrame};
use crate::store::LocalStore;

use super::coordinator::Coordinator;
use super::errors::{DfsError, OpFault};
use super::message::{self, CoordinatorRequest, CoordinatorResponse, ReplicaRequest, ReplicaResponse};
use super::replica::ReplicaNode;
use super::{replica_name, COORDINATOR_NAME};

/// Cluster-wide settings fixed at bootstrap.
pub struct ClusterConfig {
    pub replica_count: u32,
    pub storage_root: PathBuf,
}

/// Serve a replica node on `frames` until the binding goes away.
pub fn serve_replica(node: Arc<ReplicaNode>, frames: Receiver<RpcFrame>) -> JoinHandle<()> {
    thread::spawn(move || {
        for frame in frames.iter() {
            let node = Arc::clone(&node);
            thread::spawn(move || {
                let reply = dispatch_replica(&node, &frame.payload);
                let _ = frame.reply.send(reply);
            });
        }
    })
}

fn dispatch_replica(node: &ReplicaNode, payload: &[u8]) -> Vec<u8> {
    let response = match message::decode::<ReplicaRequest>(payload) {
        Ok(request) => apply_replica(node, request),
        Err(e) => ReplicaResponse::Failed {
            fault: OpFault::InvalidArgument {
                detail: format!("undecodable request: {}", e),
            },
        },
    };
    message::encode(&response)
}

fn apply_replica(node: &ReplicaNode, request: ReplicaRequest) -> ReplicaResponse {
    let result = match request {
        ReplicaRequest::CreateFile { path, propagate } => {
            node.create_file(&path, propagate).map(|_| ReplicaResponse::Done)
        }
        ReplicaRequest::WriteFile {
            path,
            content,
            propagate,
        } => node
            .write_file(&path, &content, propagate)
            .map(|_| ReplicaResponse::Done),
        ReplicaRequest::ReadFile { path } => node
            .read_file(&path)
            .map(|content| ReplicaResponse::FileContent { content }),
        ReplicaRequest::Remove { path, propagate } => {
            node.remove(&path, propagate).map(|_| ReplicaResponse::Done)
        }
        ReplicaRequest::MoveFile {
            source,
            target,
            propagate,
        } => node
            .move_file(&source, &target, propagate)
            .map(|_| ReplicaResponse::Done),
        ReplicaRequest::RenameFile {
            path,
            new_name,
            propagate,
        } => node
            .rename_file(&path, &new_name, propagate)
            .map(|_| ReplicaResponse::Done),
        ReplicaRequest::CreateDirectory { path, propagate } => node
            .create_directory(&path, propagate)
            .map(|_| ReplicaResponse::Done),
        ReplicaRequest::ListDirectory { path } => node
            .list_directory(&path)
            .map(|entries| ReplicaResponse::Listing { entries }),
        ReplicaRequest::ConnectPeers { replica_count } => node
            .connect_peers(replica_count)
            .map(|_| ReplicaResponse::Done),
        ReplicaRequest::IsAlive => Ok(ReplicaResponse::Alive),
    };
    result.unwrap_or_else(|fault| ReplicaResponse::Failed { fault })
}

/// Serve the coordinator on `frames` until the binding goes away.
pub fn serve_coordinator(
    coordinator: Arc<Coordinator>,
    frames: Receiver<RpcFrame>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for frame in frames.iter() {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let reply = dispatch_coordinator(&coordinator, &frame.payload);
                let _ = frame.reply.send(reply);
            });
        }
    })
}

fn dispatch_coordinator(coordinator: &Coordinator, payload: &[u8]) -> Vec<u8> {
    let response = match message::decode::<CoordinatorRequest>(payload) {
        Ok(request) => apply_coordinator(coordinator, request),
        Err(e) => CoordinatorResponse::Failed {
            fault: OpFault::InvalidArgument {
                detail: format!("undecodable request: {}", e),
            },
        },
    };
    message::encode(&response)
}

fn apply_coordinator(coordinator: &Coordinator, request: CoordinatorRequest) -> CoordinatorResponse {
    match request {
        CoordinatorRequest::StartOperation { kind, path } => {
            match coordinator.start_operation(kind, &path) {
                Ok(replica_id) => CoordinatorResponse::Started { replica_id },
                Err(fault) => CoordinatorResponse::Failed { fault },
            }
        }
        CoordinatorRequest::EndOperation { kind, path } => {
            match coordinator.end_operation(kind, &path) {
                Ok(()) => CoordinatorResponse::Ended,
                Err(fault) => CoordinatorResponse::Failed { fault },
            }
        }
        CoordinatorRequest::ReplicaCount => CoordinatorResponse::ReplicaCount {
            count: coordinator.replica_count(),
        },
    }
}

/// Start every replica and the coordinator, in that order.
///
/// Replicas bind first so the coordinator's construction-time lookups and
/// peer-learning calls find them all; a replica's own constructor never
/// assumes its peers exist yet.
pub fn bootstrap_cluster(
    registry: &Arc<Registry>,
    config: &ClusterConfig,
) -> Result<Vec<JoinHandle<()>>, DfsError> {
    let mut services = Vec::with_capacity(config.replica_count as usize + 1);

    for id in 0..config.replica_count {
        let store = LocalStore::new(&config.storage_root, id).map_err(|e| DfsError::Io {
            detail: format!("cannot initialize storage for replica {}: {}", id, e),
        })?;
        info!("replica {} serving from {}", id, store.root().display());
        let node = Arc::new(ReplicaNode::new(id, store, Arc::clone(registry)));
        let frames = registry.bind(&replica_name(id));
        services.push(serve_replica(node, frames));
    }

    let coordinator = Arc::new(Coordinator::new(registry, config.replica_count)?);
    let frames = registry.bind(COORDINATOR_NAME);
    services.push(serve_coordinator(coordinator, frames));
    info!("coordinator serving {} replicas", config.replica_count);

    Ok(services)
}
