//! Session module - one negotiated connection to an input method server.
//!
//! A [`Session`] owns everything scoped to the connection: the transport,
//! the frame reader, the attribute schemas, the extension table, the
//! dispatch table for server-initiated frames, and the input contexts.
//!
//! The model is single-threaded and blocking. I/O only happens inside a
//! call (while waiting for its reply) or inside [`Session::pump`]; frames
//! that arrive in the meantime are routed through the dispatch table.
//!
//! ```text
//! Discover -> TransportChosen -> Connecting -> (AuthNegotiating)* -> Connected
//!          -> Opening -> EncodingNegotiating -> Ready
//! ```
//!
//! `Failed` is reachable from every handshake phase. A reconnectable
//! `Ready` session whose transport drops moves to `Disconnected` and runs
//! the handshake again on the next operation.

mod call;
mod callbacks;
mod extension;
mod handshake;
mod inbound;
mod open;
mod ops;
mod reconnect;

pub use callbacks::{
    CaretRequest, DrawText, ImCallbacks, NoCallbacks, PreeditDraw, StatusDraw,
    StringConversionRequest,
};
pub use extension::{Extension, ExtensionKind, ExtensionTable};
pub use handshake::{AuthStep, Authenticator};

pub(crate) use call::ReplyMatch;

use std::collections::VecDeque;

use tracing::debug;

use crate::attr::{HotKeyTrigger, Level, ModeMap, QuarkSet, QuarkTable, Schema, ValueStore};
use crate::config::ClientConfig;
use crate::encoding::TextEncoding;
use crate::error::{Result, XimError};
use crate::event::LocalEvent;
use crate::handler::{
    CommitRecord, ContextHandle, ContextRegistry, DispatchTable, EventMasks, InputContext,
};
use crate::protocol::{Endian, Frame, FrameBuffer, ProtocolVersion};
use crate::transport::discovery::ServerDirectory;
use crate::transport::{Transport, TransportRegistry};

/// Phase of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Discover,
    TransportChosen,
    Connecting,
    AuthNegotiating,
    Connected,
    Opening,
    EncodingNegotiating,
    Ready,
    /// Transport lost; values are kept for replay.
    Disconnected,
    Failed,
    /// Orderly disconnect completed.
    Closed,
}

/// Server directory plus the bindings to choose a transport from.
pub(crate) struct Discovery {
    pub(crate) directory: Box<dyn ServerDirectory>,
    pub(crate) registry: TransportRegistry,
}

/// Trigger keys registered by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerKeys {
    pub on: Vec<HotKeyTrigger>,
    pub off: Vec<HotKeyTrigger>,
}

/// A connection to one input method server.
pub struct Session {
    config: ClientConfig,
    state: SessionState,
    endian: Endian,
    transport: Option<Box<dyn Transport>>,
    discovery: Option<Discovery>,
    reader: FrameBuffer,
    read_capacity: usize,
    version: Option<ProtocolVersion>,
    server: Option<String>,
    imid: Option<u16>,
    im_schema: Schema,
    ic_schema: Schema,
    im_modes: ModeMap,
    im_values: ValueStore,
    /// IM values set while disconnected.
    im_saved: QuarkSet,
    quarks: QuarkTable,
    encoding: Option<TextEncoding>,
    extensions: ExtensionTable,
    handlers: DispatchTable<Session>,
    contexts: ContextRegistry,
    events: VecDeque<LocalEvent>,
    triggers: TriggerKeys,
    dynamic_flow: bool,
    default_masks: EventMasks,
    authenticator: Option<Box<dyn Authenticator>>,
    callbacks: Box<dyn ImCallbacks>,
    reconnecting: bool,
}

impl Session {
    /// Create a session builder.
    pub fn builder() -> crate::client::SessionBuilder {
        crate::client::SessionBuilder::new()
    }

    pub(crate) fn new(
        config: ClientConfig,
        transport: Option<Box<dyn Transport>>,
        discovery: Option<Discovery>,
        authenticator: Option<Box<dyn Authenticator>>,
        callbacks: Box<dyn ImCallbacks>,
    ) -> Self {
        let endian = config.endian();
        let read_capacity = config.read_buffer_size;
        Self {
            config,
            state: SessionState::Discover,
            endian,
            transport,
            discovery,
            reader: FrameBuffer::new(endian),
            read_capacity,
            version: None,
            server: None,
            imid: None,
            im_schema: Schema::empty(Level::Im),
            ic_schema: Schema::empty(Level::Ic),
            im_modes: ModeMap::for_im(),
            im_values: ValueStore::default(),
            im_saved: QuarkSet::default(),
            quarks: QuarkTable::new(),
            encoding: None,
            extensions: ExtensionTable::new(),
            handlers: DispatchTable::new(),
            contexts: ContextRegistry::new(),
            events: VecDeque::new(),
            triggers: TriggerKeys::default(),
            dynamic_flow: false,
            default_masks: EventMasks::default(),
            authenticator,
            callbacks,
            reconnecting: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Byte order announced to the server.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Server-assigned session id, while open.
    pub fn imid(&self) -> Option<u16> {
        self.imid
    }

    /// Version the server acknowledged.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Server chosen by discovery.
    pub fn server_name(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Encoding negotiated for committed text.
    pub fn encoding(&self) -> Option<&TextEncoding> {
        self.encoding.as_ref()
    }

    pub fn im_schema(&self) -> &Schema {
        &self.im_schema
    }

    pub fn ic_schema(&self) -> &Schema {
        &self.ic_schema
    }

    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn trigger_keys(&self) -> &TriggerKeys {
        &self.triggers
    }

    /// Whether the server switched the session to dynamic event flow.
    pub fn is_dynamic_flow(&self) -> bool {
        self.dynamic_flow
    }

    /// Masks applied to contexts the server has not configured.
    pub fn default_masks(&self) -> EventMasks {
        self.default_masks
    }

    pub fn context(&self, handle: ContextHandle) -> Result<&InputContext> {
        self.contexts.get(handle)
    }

    pub fn contexts(&self) -> Vec<ContextHandle> {
        self.contexts.handles()
    }

    /// Next event handed back for local processing.
    pub fn next_event(&mut self) -> Option<LocalEvent> {
        self.events.pop_front()
    }

    /// Oldest pending commit of `handle`.
    pub fn lookup_commit(&mut self, handle: ContextHandle) -> Result<Option<CommitRecord>> {
        Ok(self.contexts.get_mut(handle)?.core.pop_commit())
    }

    /// Register an extra handler for server-initiated frames.
    ///
    /// Handlers are tried in registration order; the first to return
    /// `Ok(true)` claims the frame.
    pub fn register_handler<F>(
        &mut self,
        major: u8,
        minor: Option<u8>,
        name: &'static str,
        handler: F,
    ) where
        F: Fn(&mut Session, &Frame) -> Result<bool> + 'static,
    {
        self.handlers.register(major, minor, name, handler);
    }

    pub fn unregister_handler(&mut self, name: &str) {
        self.handlers.unregister(name);
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    fn require_imid(&self, op: &'static str) -> Result<u16> {
        self.imid.ok_or(XimError::InvalidState {
            state: self.state,
            op,
        })
    }

    /// Server id of a context that must be known to the server.
    fn require_icid(&self, handle: ContextHandle, op: &'static str) -> Result<u16> {
        self.contexts
            .get(handle)?
            .icid()
            .ok_or(XimError::InvalidState {
                state: self.state,
                op,
            })
    }

    /// Text encoding of received strings; compound text until negotiated.
    fn text_encoding(&self) -> TextEncoding {
        self.encoding.clone().unwrap_or_default()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("imid", &self.imid)
            .field("server", &self.server)
            .field("encoding", &self.encoding)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}
