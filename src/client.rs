//! Session builder.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring a
//! [`Session`] before the handshake:
//! 1. Pick the transport (fixed, or discovered through a server directory)
//! 2. Adjust the [`ClientConfig`]
//! 3. Attach an authenticator and callbacks
//! 4. `build()` an idle session, or `connect()` one that is `Ready`
//!
//! # Example
//!
//! ```
//! use xim_client::transport::MemoryTransport;
//! use xim_client::{Session, SessionState};
//!
//! let (transport, _peer) = MemoryTransport::pair(xim_client::protocol::Endian::Little);
//! let session = Session::builder()
//!     .locale("ja_JP.UTF-8")
//!     .reconnectable(true)
//!     .transport(transport)
//!     .build();
//! assert_eq!(session.state(), SessionState::Discover);
//! ```

use crate::config::{ByteOrder, ClientConfig};
use crate::error::Result;
use crate::protocol::ProtocolVersion;
use crate::session::{Authenticator, Discovery, ImCallbacks, NoCallbacks, Session};
use crate::transport::discovery::ServerDirectory;
use crate::transport::{Transport, TransportRegistry};

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    config: ClientConfig,
    transport: Option<Box<dyn Transport>>,
    discovery: Option<Discovery>,
    authenticator: Option<Box<dyn Authenticator>>,
    callbacks: Option<Box<dyn ImCallbacks>>,
}

impl SessionBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            discovery: None,
            authenticator: None,
            callbacks: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Locale sent when opening the session.
    pub fn locale(mut self, locale: &str) -> Self {
        self.config.locale = locale.to_string();
        self
    }

    /// Only accept the server announced under `name`.
    pub fn server_name(mut self, name: &str) -> Self {
        self.config.server_name = Some(name.to_string());
        self
    }

    /// Apply a modifier string such as `@im=ibus`.
    pub fn modifiers(mut self, modifiers: &str) -> Self {
        self.config.apply_modifiers(modifiers);
        self
    }

    /// Keep the session and its values across a dropped transport.
    ///
    /// Default: false
    pub fn reconnectable(mut self, reconnectable: bool) -> Self {
        self.config.reconnectable = reconnectable;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.config.byte_order = byte_order;
        self
    }

    /// Encoding names to propose, most preferred first.
    pub fn encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }

    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Initial capacity of the frame reader.
    ///
    /// Default: 2048
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Inline message bound of the display relay when the server states
    /// none.
    ///
    /// Default: 20
    pub fn relay_message_bound(mut self, bound: usize) -> Self {
        self.config.relay_message_bound = bound;
        self
    }

    /// Talk to the server over `transport`, skipping discovery.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Discover the server through `directory` and pick a transport from
    /// `registry`.
    pub fn discovery(
        mut self,
        directory: impl ServerDirectory + 'static,
        registry: TransportRegistry,
    ) -> Self {
        self.discovery = Some(Discovery {
            directory: Box::new(directory),
            registry,
        });
        self
    }

    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Box::new(authenticator));
        self
    }

    /// Preedit and status callbacks. Default: [`NoCallbacks`].
    pub fn callbacks(mut self, callbacks: impl ImCallbacks + 'static) -> Self {
        self.callbacks = Some(Box::new(callbacks));
        self
    }

    /// Build an idle session; call [`Session::connect`] to run the handshake.
    pub fn build(self) -> Session {
        let callbacks = self
            .callbacks
            .unwrap_or_else(|| Box::new(NoCallbacks));
        Session::new(
            self.config,
            self.transport,
            self.discovery,
            self.authenticator,
            callbacks,
        )
    }

    /// Build and run the handshake.
    pub fn connect(self) -> Result<Session> {
        let mut session = self.build();
        session.connect()?;
        Ok(session)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XimError;
    use crate::protocol::Endian;
    use crate::session::SessionState;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.config.locale, "C");
        assert!(!builder.config.reconnectable);
        assert!(builder.transport.is_none());
        assert!(builder.callbacks.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let session = SessionBuilder::new()
            .locale("en_US.UTF-8")
            .modifiers("@im=kinput2")
            .encodings(["UTF-8"])
            .byte_order(ByteOrder::Big)
            .read_buffer_size(64)
            .build();
        let config = session.config();
        assert_eq!(config.locale, "en_US.UTF-8");
        assert_eq!(config.server_name.as_deref(), Some("kinput2"));
        assert_eq!(config.encodings, vec!["UTF-8".to_string()]);
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(session.endian(), Endian::Big);
        assert_eq!(session.state(), SessionState::Discover);
    }

    #[test]
    fn test_connect_without_transport_fails() {
        let err = SessionBuilder::new().connect().unwrap_err();
        assert!(matches!(err, XimError::NoServer(_)));
    }

    #[test]
    fn test_connect_to_silent_peer_fails() {
        let (transport, _peer) = MemoryTransport::pair(Endian::Little);
        let mut session = SessionBuilder::new()
            .byte_order(ByteOrder::Little)
            .transport(transport)
            .build();
        assert!(session.connect().is_err());
        assert_eq!(session.state(), SessionState::Failed);
    }
}
