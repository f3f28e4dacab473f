//! Protocol integration tests: full clusters wired over the in-process
//! transport, with per-test storage roots.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::net::{Registry, RpcFrame};
use crate::store::LocalStore;

use super::client::ClientSession;
use super::coordinator::Coordinator;
use super::errors::DfsError;
use super::handle::ReplicaHandle;
use super::message::{self, OpKind, ReplicaRequest, ReplicaResponse};
use super::replica::ReplicaNode;
use super::server::{bootstrap_cluster, serve_replica, ClusterConfig};
use super::{replica_name, COORDINATOR_NAME};

/// A full cluster (coordinator + replicas) on a temporary storage root.
struct TestCluster {
    registry: Arc<Registry>,
    storage: tempfile::TempDir,
    _services: Vec<JoinHandle<()>>,
}

impl TestCluster {
    fn start(replica_count: u32) -> Self {
        let registry = Arc::new(Registry::new());
        let storage = tempfile::tempdir().unwrap();
        let config = ClusterConfig {
            replica_count,
            storage_root: storage.path().to_path_buf(),
        };
        let services = bootstrap_cluster(&registry, &config).unwrap();
        TestCluster {
            registry,
            storage,
            _services: services,
        }
    }

    fn client(&self) -> ClientSession {
        ClientSession::connect(&self.registry).unwrap()
    }

    fn replica_root(&self, replica_id: u32) -> PathBuf {
        self.storage.path().join(format!("replica{}", replica_id))
    }

    fn kill_replica(&self, replica_id: u32) {
        assert!(self.registry.kill(&replica_name(replica_id)));
    }

    fn kill_coordinator(&self) {
        assert!(self.registry.kill(COORDINATOR_NAME));
    }
}

/// Spawn `count` replica services without a coordinator, returning the
/// node handles for direct inspection.
fn start_replicas(registry: &Arc<Registry>, root: &Path, count: u32) -> Vec<Arc<ReplicaNode>> {
    let mut nodes = Vec::new();
    for id in 0..count {
        let store = LocalStore::new(root, id).unwrap();
        let node = Arc::new(ReplicaNode::new(id, store, Arc::clone(registry)));
        let frames = registry.bind(&replica_name(id));
        let _ = serve_replica(Arc::clone(&node), frames);
        nodes.push(node);
    }
    nodes
}

/// Drive peer-learning on every replica, as the coordinator would.
fn connect_all(registry: &Registry, count: u32) {
    for id in 0..count {
        let handle = ReplicaHandle::new(id, registry.lookup(&replica_name(id)).unwrap());
        match handle
            .call(&ReplicaRequest::ConnectPeers {
                replica_count: count,
            })
            .unwrap()
        {
            ReplicaResponse::Done => {}
            other => panic!("connect-peers failed on replica {}: {:?}", id, other),
        }
    }
}

fn replica_handle(registry: &Registry, id: u32) -> ReplicaHandle {
    ReplicaHandle::new(id, registry.lookup(&replica_name(id)).unwrap())
}

#[test]
fn test_end_to_end_create_write_read_list() {
    let cluster = TestCluster::start(3);
    let client = cluster.client();

    client.create_directory("/docs").unwrap();
    client.create_file("/docs/b.txt").unwrap();
    client.write_file("/docs/b.txt", b"hello").unwrap();

    assert_eq!(client.read_file("/docs/b.txt").unwrap(), b"hello");
    let listing = client.list_directory("/docs/").unwrap();
    assert!(listing.contains(&"b.txt".to_string()));

    // Every replica holds the full tree.
    for id in 0..3 {
        let on_disk = cluster.replica_root(id).join("docs/b.txt");
        assert_eq!(fs::read(&on_disk).unwrap(), b"hello", "replica {}", id);
    }
}

#[test]
fn test_move_and_rename_run_everywhere() {
    let cluster = TestCluster::start(3);
    let client = cluster.client();

    client.create_directory("/a").unwrap();
    client.create_directory("/b").unwrap();
    client.create_file("/a/f.txt").unwrap();

    client.move_file("/a/f.txt", "/b/f.txt").unwrap();
    for id in 0..3 {
        assert!(cluster.replica_root(id).join("b/f.txt").exists());
        assert!(!cluster.replica_root(id).join("a/f.txt").exists());
    }

    client.rename_file("/b/f.txt", "g.txt").unwrap();
    assert_eq!(client.list_directory("/b").unwrap(), vec!["g.txt"]);
    for id in 0..3 {
        assert!(cluster.replica_root(id).join("b/g.txt").exists());
    }
}

#[test]
fn test_remove_propagates_and_respects_non_empty() {
    let cluster = TestCluster::start(2);
    let client = cluster.client();

    client.create_directory("/d").unwrap();
    client.create_file("/d/x.txt").unwrap();

    assert!(matches!(
        client.remove("/d"),
        Err(DfsError::NotEmpty { .. })
    ));

    client.remove("/d/x.txt").unwrap();
    client.remove("/d").unwrap();
    for id in 0..2 {
        assert!(!cluster.replica_root(id).join("d").exists());
    }
}

#[test]
fn test_validation_runs_before_any_coordinator_contact() {
    let cluster = TestCluster::start(2);
    let client = cluster.client();

    // With the coordinator down, only errors raised before contacting it
    // can come back as validation failures.
    cluster.kill_coordinator();

    assert!(matches!(
        client.rename_file("/a/b.txt", "x/y.txt"),
        Err(DfsError::InvalidPath(_))
    ));
    assert!(matches!(
        client.rename_file("/a/b.txt", "noext"),
        Err(DfsError::InvalidPath(_))
    ));
    assert!(matches!(
        client.move_file("/a/b.txt", "a/b.txt"),
        Err(DfsError::InvalidPath(_))
    ));
    assert!(matches!(
        client.create_file("/a/noext"),
        Err(DfsError::InvalidPath(_))
    ));
    assert!(matches!(
        client.create_directory("/dir.txt"),
        Err(DfsError::InvalidPath(_))
    ));
    assert!(matches!(
        client.read_file("/a/..secret.txt"),
        Err(DfsError::InvalidPath(_))
    ));
}

#[test]
fn test_coordinator_unreachable_is_fatal() {
    let cluster = TestCluster::start(2);
    let client = cluster.client();
    cluster.kill_coordinator();

    let err = client.create_file("/a.txt").unwrap_err();
    assert!(matches!(err, DfsError::CoordinatorUnreachable));
    assert!(err.is_fatal());
}

#[test]
fn test_selection_and_propagation_survive_a_downed_replica() {
    let cluster = TestCluster::start(3);
    let client = cluster.client();
    cluster.kill_replica(1);

    for i in 0..10 {
        client.create_file(&format!("/f{}.txt", i)).unwrap();
    }

    for i in 0..10 {
        let name = format!("f{}.txt", i);
        assert!(cluster.replica_root(0).join(&name).exists());
        assert!(cluster.replica_root(2).join(&name).exists());
        assert!(!cluster.replica_root(1).join(&name).exists());
    }
}

#[test]
fn test_no_replica_reachable_is_fatal() {
    let cluster = TestCluster::start(2);
    let client = cluster.client();
    cluster.kill_replica(0);
    cluster.kill_replica(1);

    let err = client.create_file("/a.txt").unwrap_err();
    assert!(matches!(err, DfsError::NoReplicaReachable));
    assert!(err.is_fatal());
}

/// A replica that answers the probe and peer-learning but dies on every
/// actual operation, modelling a node going down between the coordinator's
/// grant and the client's call.
fn spawn_half_dead_replica(frames: Receiver<RpcFrame>) {
    thread::spawn(move || {
        for frame in frames.iter() {
            let request: ReplicaRequest = message::decode(&frame.payload).unwrap();
            let reply = match request {
                ReplicaRequest::IsAlive => Some(ReplicaResponse::Alive),
                ReplicaRequest::ConnectPeers { .. } => Some(ReplicaResponse::Done),
                _ => None,
            };
            if let Some(response) = reply {
                let _ = frame.reply.send(message::encode(&response));
            }
        }
    });
}

#[test]
fn test_replica_down_mid_operation_is_retryable_and_releases_the_lock() {
    let registry = Arc::new(Registry::new());
    spawn_half_dead_replica(registry.bind(&replica_name(0)));

    let coordinator = Arc::new(Coordinator::new(&registry, 1).unwrap());
    let _ = super::server::serve_coordinator(coordinator, registry.bind(COORDINATOR_NAME));

    let client = ClientSession::connect(&registry).unwrap();

    let err = client.create_file("/a.txt").unwrap_err();
    assert!(matches!(err, DfsError::ReplicaUnreachable { replica_id: 0 }));
    assert!(err.is_retryable());

    // The write lock was released on the failure path: the retry reaches
    // the replica again instead of dying on contention.
    let err = client.create_file("/a.txt").unwrap_err();
    assert!(matches!(err, DfsError::ReplicaUnreachable { replica_id: 0 }));
}

#[test]
fn test_propagation_skips_a_downed_peer() {
    // A node with three peers: peer 1 is unreachable, peers 0 and 2 apply.
    let registry = Arc::new(Registry::new());
    let storage = tempfile::tempdir().unwrap();
    let _nodes = start_replicas(&registry, storage.path(), 4);
    connect_all(&registry, 4);

    registry.kill(&replica_name(1));

    let primary = replica_handle(&registry, 3);
    let response = primary
        .call(&ReplicaRequest::CreateFile {
            path: "/p.txt".into(),
            propagate: true,
        })
        .unwrap();
    assert!(matches!(response, ReplicaResponse::Done));

    for id in [0, 2, 3] {
        assert!(storage.path().join(format!("replica{}/p.txt", id)).exists());
    }
    assert!(!storage.path().join("replica1/p.txt").exists());
}

#[test]
fn test_propagation_aborts_on_a_diverged_peer() {
    let registry = Arc::new(Registry::new());
    let storage = tempfile::tempdir().unwrap();
    let nodes = start_replicas(&registry, storage.path(), 4);
    connect_all(&registry, 4);

    // Replica 2 already has the file: it diverged from the others.
    nodes[2].create_file("/c.txt", false).unwrap();

    let primary = replica_handle(&registry, 0);
    let response = primary
        .call(&ReplicaRequest::CreateFile {
            path: "/c.txt".into(),
            propagate: true,
        })
        .unwrap();
    assert!(matches!(
        response,
        ReplicaResponse::Failed {
            fault: super::errors::OpFault::Inconsistent { replica_id: 2 }
        }
    ));

    // Fan-out runs in id order and stops at the divergent peer: replica 1
    // was updated, replica 3 was never contacted.
    assert!(storage.path().join("replica1/c.txt").exists());
    assert!(!storage.path().join("replica3/c.txt").exists());
}

#[test]
fn test_coordinator_serializes_writers_and_readers() {
    let registry = Arc::new(Registry::new());
    let storage = tempfile::tempdir().unwrap();
    let _nodes = start_replicas(&registry, storage.path(), 1);

    let coordinator = Coordinator::new(&registry, 1).unwrap();

    let id = coordinator.start_operation(OpKind::Write, "/a.txt").unwrap();
    assert!(id < 1);
    assert!(coordinator.start_operation(OpKind::Write, "/a.txt").is_err());
    assert!(coordinator.start_operation(OpKind::Read, "/a.txt").is_err());

    coordinator.end_operation(OpKind::Write, "/a.txt").unwrap();

    coordinator.start_operation(OpKind::Read, "/a.txt").unwrap();
    coordinator.start_operation(OpKind::Read, "/a.txt").unwrap();
    assert!(coordinator.start_operation(OpKind::Write, "/a.txt").is_err());

    coordinator.end_operation(OpKind::Read, "/a.txt").unwrap();
    coordinator.end_operation(OpKind::Read, "/a.txt").unwrap();

    // Releasing an idle path is a protocol violation.
    assert!(coordinator.end_operation(OpKind::Read, "/a.txt").is_err());
}

#[test]
fn test_coordinator_requires_every_replica_at_construction() {
    let registry = Registry::new();
    let err = Coordinator::new(&registry, 1).unwrap_err();
    assert!(matches!(err, DfsError::Lookup { .. }));
    assert!(err.is_fatal());
}
