//! Channel-backed transport and name registry.
//!
//! Plays the role a remote-object registry plays in a networked deployment:
//! services bind a name and drain request frames, callers look the name up
//! and get back a handle whose `call` sends one frame and waits for the
//! reply under a timeout. A failure to complete the call (killed binding,
//! closed channel, timeout) is the one and only "unreachable" signal the
//! rest of the system ever sees.

pub mod registry;

pub use registry::{CommFault, Registry, RpcFrame, ServiceHandle, RPC_TIMEOUT};
