//! Name registry and request/reply frames between services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

/// Per-call deadline at the transport boundary.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// A call that could not complete. Carries no information about the remote
/// state: the callee may or may not have observed the request.
#[derive(Debug, Clone, Error)]
pub enum CommFault {
    #[error("service `{0}` is not reachable")]
    Unreachable(String),
    #[error("call to `{0}` timed out")]
    Timeout(String),
    #[error("garbled reply from `{0}`")]
    Garbled(String),
}

impl CommFault {
    /// True when the fault means "the other end is down or gone", the only
    /// kind of failure propagation is allowed to skip over.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CommFault::Unreachable(_) | CommFault::Timeout(_))
    }
}

/// One in-flight request: encoded payload plus the reply slot.
pub struct RpcFrame {
    pub payload: Vec<u8>,
    pub reply: Sender<Vec<u8>>,
}

/// A looked-up reference to a bound service.
#[derive(Clone, Debug)]
pub struct ServiceHandle {
    name: String,
    tx: Sender<RpcFrame>,
    killed: Arc<AtomicBool>,
}

impl ServiceHandle {
    /// Send one request and wait for the reply.
    ///
    /// The killed flag models the remote process being down: calls fail
    /// immediately instead of queueing frames nobody will drain.
    pub fn call(&self, payload: Vec<u8>) -> Result<Vec<u8>, CommFault> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(CommFault::Unreachable(self.name.clone()));
        }
        let (reply_tx, reply_rx) = bounded(1);
        let frame = RpcFrame {
            payload,
            reply: reply_tx,
        };
        self.tx
            .send(frame)
            .map_err(|_| CommFault::Unreachable(self.name.clone()))?;
        match reply_rx.recv_timeout(RPC_TIMEOUT) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(CommFault::Timeout(self.name.clone())),
            Err(RecvTimeoutError::Disconnected) => Err(CommFault::Unreachable(self.name.clone())),
        }
    }
}

/// Name-to-handle map shared by every component in the process.
pub struct Registry {
    services: Mutex<HashMap<String, ServiceHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Bind `name` and return the receiver the service must drain.
    ///
    /// Rebinding a name replaces the previous handle; outstanding handles to
    /// the old binding keep failing once their sender disconnects.
    pub fn bind(&self, name: &str) -> Receiver<RpcFrame> {
        let (tx, rx) = unbounded();
        let handle = ServiceHandle {
            name: name.to_string(),
            tx,
            killed: Arc::new(AtomicBool::new(false)),
        };
        self.services
            .lock()
            .unwrap()
            .insert(name.to_string(), handle);
        rx
    }

    /// Look up a bound name.
    pub fn lookup(&self, name: &str) -> Result<ServiceHandle, CommFault> {
        self.services
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CommFault::Unreachable(name.to_string()))
    }

    /// Mark a binding as down. Every handle to it, past and future, fails
    /// with a communication fault from this point on.
    pub fn kill(&self, name: &str) -> bool {
        match self.services.lock().unwrap().get(name) {
            Some(handle) => {
                handle.killed.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
