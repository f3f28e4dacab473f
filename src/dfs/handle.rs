//! Typed call wrappers over registry handles.

use crate::net::{CommFault, ServiceHandle};

use super::errors::DfsError;
use super::message::{self, CoordinatorRequest, CoordinatorResponse, OpKind, ReplicaRequest, ReplicaResponse};

/// Reference to the coordinator service.
///
/// Any communication failure here is fatal to the session: the caller
/// cannot know what state its locks are in and must stop rather than
/// double-act.
#[derive(Clone)]
pub struct CoordinatorHandle {
    inner: ServiceHandle,
}

impl CoordinatorHandle {
    pub fn new(inner: ServiceHandle) -> Self {
        CoordinatorHandle { inner }
    }

    pub fn start_operation(&self, kind: OpKind, path: &str) -> Result<u32, DfsError> {
        match self.call(CoordinatorRequest::StartOperation {
            kind,
            path: path.to_string(),
        })? {
            CoordinatorResponse::Started { replica_id } => Ok(replica_id),
            CoordinatorResponse::Failed { fault } => Err(DfsError::from_fault(fault)),
            other => Err(unexpected("start-operation", &other)),
        }
    }

    pub fn end_operation(&self, kind: OpKind, path: &str) -> Result<(), DfsError> {
        match self.call(CoordinatorRequest::EndOperation {
            kind,
            path: path.to_string(),
        })? {
            CoordinatorResponse::Ended => Ok(()),
            CoordinatorResponse::Failed { fault } => Err(DfsError::from_fault(fault)),
            other => Err(unexpected("end-operation", &other)),
        }
    }

    pub fn replica_count(&self) -> Result<u32, DfsError> {
        match self.call(CoordinatorRequest::ReplicaCount)? {
            CoordinatorResponse::ReplicaCount { count } => Ok(count),
            CoordinatorResponse::Failed { fault } => Err(DfsError::from_fault(fault)),
            other => Err(unexpected("replica-count", &other)),
        }
    }

    fn call(&self, request: CoordinatorRequest) -> Result<CoordinatorResponse, DfsError> {
        let bytes = self
            .inner
            .call(message::encode(&request))
            .map_err(|_| DfsError::CoordinatorUnreachable)?;
        message::decode(&bytes).map_err(|e| DfsError::Protocol {
            detail: format!("undecodable coordinator reply: {}", e),
        })
    }
}

fn unexpected(call: &str, response: &CoordinatorResponse) -> DfsError {
    DfsError::Protocol {
        detail: format!("unexpected {} reply: {:?}", call, response),
    }
}

/// Reference to one replica node.
///
/// `call` keeps the communication layer visible to the caller: propagation
/// must tell "unreachable" (skip) apart from every other failure (fatal
/// divergence), and the client session classifies the same split as
/// retryable versus user-facing.
#[derive(Clone, Debug)]
pub struct ReplicaHandle {
    replica_id: u32,
    inner: ServiceHandle,
}

impl ReplicaHandle {
    pub fn new(replica_id: u32, inner: ServiceHandle) -> Self {
        ReplicaHandle { replica_id, inner }
    }

    pub fn replica_id(&self) -> u32 {
        self.replica_id
    }

    /// Send one request and decode the reply.
    pub fn call(&self, request: &ReplicaRequest) -> Result<ReplicaResponse, CommFault> {
        let bytes = self.inner.call(message::encode(request))?;
        message::decode(&bytes)
            .map_err(|_| CommFault::Garbled(format!("replica-{}", self.replica_id)))
    }

    /// Liveness probe. Completion of the call is the signal; the reply's
    /// content carries no extra information.
    pub fn is_alive(&self) -> Result<(), CommFault> {
        self.call(&ReplicaRequest::IsAlive).map(|_| ())
    }
}
