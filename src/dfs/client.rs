//! Client session: the two-phase protocol around every user operation.
//!
//! Each operation runs the same skeleton: normalize and validate the
//! path(s), ask the coordinator to start the operation (which locks the
//! path and names the replica to talk to), invoke that replica with
//! propagation enabled, then tell the coordinator the operation ended —
//! always, on success and on every failure path alike. Lock hygiene is
//! never sacrificed to error reporting.

use crate::net::Registry;

use super::errors::DfsError;
use super::handle::{CoordinatorHandle, ReplicaHandle};
use super::message::{OpKind, ReplicaRequest, ReplicaResponse};
use super::path::{clean_path, is_file_path, sibling};
use super::{replica_name, COORDINATOR_NAME};

/// A connected client of the distributed filesystem.
pub struct ClientSession {
    coordinator: CoordinatorHandle,
    replicas: Vec<ReplicaHandle>,
}

impl ClientSession {
    /// Look up the coordinator and every replica it declares.
    ///
    /// Handles are resolved once here and reused for every operation. Any
    /// lookup failure is fatal at construction.
    pub fn connect(registry: &Registry) -> Result<Self, DfsError> {
        let inner = registry.lookup(COORDINATOR_NAME).map_err(|_| DfsError::Lookup {
            name: COORDINATOR_NAME.to_string(),
        })?;
        let coordinator = CoordinatorHandle::new(inner);
        let count = coordinator.replica_count()?;

        let mut replicas = Vec::with_capacity(count as usize);
        for id in 0..count {
            let name = replica_name(id);
            let handle = registry
                .lookup(&name)
                .map_err(|_| DfsError::Lookup { name: name.clone() })?;
            replicas.push(ReplicaHandle::new(id, handle));
        }

        Ok(ClientSession {
            coordinator,
            replicas,
        })
    }

    /// Create an empty file. The name must carry an extension marker.
    pub fn create_file(&self, raw: &str) -> Result<(), DfsError> {
        let path = clean_path(raw)?;
        if !is_file_path(&path) {
            return Err(DfsError::InvalidPath(
                "file name must carry an extension".into(),
            ));
        }
        self.locked(OpKind::Write, &[&path], |id| {
            self.expect_done(
                id,
                ReplicaRequest::CreateFile {
                    path: path.clone(),
                    propagate: true,
                },
            )
        })
    }

    /// Write `content` to a file, creating it if it does not exist.
    pub fn write_file(&self, raw: &str, content: &[u8]) -> Result<(), DfsError> {
        let path = clean_path(raw)?;
        if !is_file_path(&path) {
            return Err(DfsError::InvalidPath(
                "file name must carry an extension".into(),
            ));
        }
        self.locked(OpKind::Write, &[&path], |id| {
            self.expect_done(
                id,
                ReplicaRequest::WriteFile {
                    path: path.clone(),
                    content: content.to_vec(),
                    propagate: true,
                },
            )
        })
    }

    /// Read a file's content.
    pub fn read_file(&self, raw: &str) -> Result<Vec<u8>, DfsError> {
        let path = clean_path(raw)?;
        if !is_file_path(&path) {
            return Err(DfsError::InvalidPath("reading requires a file path".into()));
        }
        self.locked(OpKind::Read, &[&path], |id| {
            match self.invoke(id, ReplicaRequest::ReadFile { path: path.clone() })? {
                ReplicaResponse::FileContent { content } => Ok(content),
                other => Err(unexpected(&other)),
            }
        })
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, raw: &str) -> Result<(), DfsError> {
        let path = clean_path(raw)?;
        self.locked(OpKind::Write, &[&path], |id| {
            self.expect_done(
                id,
                ReplicaRequest::Remove {
                    path: path.clone(),
                    propagate: true,
                },
            )
        })
    }

    /// Move a file to a new location. Both paths are locked for writing;
    /// the replica chosen for the source serves the whole move.
    pub fn move_file(&self, source_raw: &str, target_raw: &str) -> Result<(), DfsError> {
        let source = clean_path(source_raw)?;
        let target = clean_path(target_raw)?;
        if !is_file_path(&source) {
            return Err(DfsError::InvalidPath("only files can be moved".into()));
        }
        if !is_file_path(&target) {
            return Err(DfsError::InvalidPath(
                "move target must carry an extension".into(),
            ));
        }
        if source == target {
            return Err(DfsError::InvalidPath(
                "source and target are the same path".into(),
            ));
        }
        self.locked(OpKind::Write, &[&source, &target], |id| {
            self.expect_done(
                id,
                ReplicaRequest::MoveFile {
                    source: source.clone(),
                    target: target.clone(),
                    propagate: true,
                },
            )
        })
    }

    /// Rename a file in place. The new name is a bare file name: no path
    /// separator, extension marker required. Both the old and the new path
    /// are locked for writing.
    pub fn rename_file(&self, raw: &str, new_name: &str) -> Result<(), DfsError> {
        if new_name.contains('/') {
            return Err(DfsError::InvalidPath(
                "new name cannot contain a path separator".into(),
            ));
        }
        if !new_name.contains('.') {
            return Err(DfsError::InvalidPath(
                "new name must carry an extension".into(),
            ));
        }
        let path = clean_path(raw)?;
        let renamed = sibling(&path, new_name);
        self.locked(OpKind::Write, &[&path, &renamed], |id| {
            self.expect_done(
                id,
                ReplicaRequest::RenameFile {
                    path: path.clone(),
                    new_name: new_name.to_string(),
                    propagate: true,
                },
            )
        })
    }

    /// Create a directory. Directory names never carry an extension marker.
    pub fn create_directory(&self, raw: &str) -> Result<(), DfsError> {
        if raw.contains('.') {
            return Err(DfsError::InvalidPath(
                "directory name cannot contain an extension marker".into(),
            ));
        }
        let path = clean_path(raw)?;
        self.locked(OpKind::Write, &[&path], |id| {
            self.expect_done(
                id,
                ReplicaRequest::CreateDirectory {
                    path: path.clone(),
                    propagate: true,
                },
            )
        })
    }

    /// List the entries of a directory.
    pub fn list_directory(&self, raw: &str) -> Result<Vec<String>, DfsError> {
        let path = clean_path(raw)?;
        if is_file_path(&path) {
            return Err(DfsError::InvalidPath(
                "listing requires a directory path".into(),
            ));
        }
        self.locked(OpKind::Read, &[&path], |id| {
            match self.invoke(id, ReplicaRequest::ListDirectory { path: path.clone() })? {
                ReplicaResponse::Listing { entries } => Ok(entries),
                other => Err(unexpected(&other)),
            }
        })
    }

    /// Run `op` under the locks for `paths`.
    ///
    /// Starts every path in order; the replica id returned by the first
    /// start serves the operation. If a later start fails, the paths already
    /// started are released before the error surfaces. The matching ends
    /// always run, whatever `op` returned; an end failure (the coordinator
    /// gone, or a lock-state violation) outranks the operation's own error
    /// because the session can no longer trust its lock state.
    fn locked<T>(
        &self,
        kind: OpKind,
        paths: &[&str],
        op: impl FnOnce(u32) -> Result<T, DfsError>,
    ) -> Result<T, DfsError> {
        let mut started: Vec<&str> = Vec::with_capacity(paths.len());
        let mut chosen = None;
        for &path in paths {
            match self.coordinator.start_operation(kind, path) {
                Ok(id) => {
                    if chosen.is_none() {
                        chosen = Some(id);
                    }
                    started.push(path);
                }
                Err(err) => {
                    self.end_all(kind, &started)?;
                    return Err(err);
                }
            }
        }
        let replica_id = chosen.expect("locked() requires at least one path");

        let result = op(replica_id);
        self.end_all(kind, &started)?;
        result
    }

    fn end_all(&self, kind: OpKind, paths: &[&str]) -> Result<(), DfsError> {
        for &path in paths {
            self.coordinator.end_operation(kind, path)?;
        }
        Ok(())
    }

    /// Call a replica and classify the outcome.
    ///
    /// A communication failure here is retryable: the lock is about to be
    /// released by the caller, the tree is unchanged, and the user may
    /// simply run the command again.
    fn invoke(&self, replica_id: u32, request: ReplicaRequest) -> Result<ReplicaResponse, DfsError> {
        let handle = self.replicas.get(replica_id as usize).ok_or_else(|| {
            DfsError::Protocol {
                detail: format!("coordinator returned unknown replica id {}", replica_id),
            }
        })?;
        match handle.call(&request) {
            Ok(ReplicaResponse::Failed { fault }) => Err(DfsError::from_fault(fault)),
            Ok(response) => Ok(response),
            Err(fault) if fault.is_disconnect() => Err(DfsError::ReplicaUnreachable { replica_id }),
            Err(fault) => Err(DfsError::Protocol {
                detail: fault.to_string(),
            }),
        }
    }

    fn expect_done(&self, replica_id: u32, request: ReplicaRequest) -> Result<(), DfsError> {
        match self.invoke(replica_id, request)? {
            ReplicaResponse::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &ReplicaResponse) -> DfsError {
    DfsError::Protocol {
        detail: format!("unexpected replica reply: {:?}", response),
    }
}
