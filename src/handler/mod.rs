//! Handler module - context registry and dispatch of server traffic.
//!
//! Provides:
//! - [`DispatchTable`] - maps opcode pairs to handlers for unsolicited frames
//! - [`ContextRegistry`] - maps server context ids to local [`InputContext`]s

mod context;
mod registry;

pub use context::{
    CommitRecord, ContextBackend, ContextCore, ContextHandle, ContextRegistry, ContextTarget,
    EventMasks, InputContext,
};
pub use registry::{DispatchTable, Handler};
