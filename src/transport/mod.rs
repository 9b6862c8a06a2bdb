//! Transport module - byte pipes between client and server.
//!
//! Provides:
//! - [`Transport`] - the contract every binding implements
//! - [`SocketTransport`] - direct stream socket (Unix domain or TCP)
//! - [`RelayTransport`] - frames tunnelled through the display's
//!   inter-client messaging, via a host-supplied [`RelayChannel`]
//! - [`MemoryTransport`] - in-process peer for embedding and tests
//! - [`discovery`] - server/locale/transport announcements and the
//!   transport registry

pub mod discovery;
mod memory;
mod relay;
mod socket;

pub use discovery::{TransportAddress, TransportRegistry};
pub use memory::{MemoryPeer, MemoryTransport};
pub use relay::{RelayChannel, RelayKind, RelayLimits, RelayPacket, RelayTransport};
pub use socket::{SocketAddress, SocketTransport};

use crate::config::ClientConfig;
use crate::error::Result;

/// Which binding a transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Socket,
    Relay,
    Memory,
}

/// Byte-level connection to an input method server.
///
/// Implementations are blocking. `write` delivers every byte or fails;
/// `read` waits for data and may return fewer bytes than requested. A
/// closed peer is reported as an error. A return of `0` is tolerated as a
/// spurious wakeup, but only a few times in a row.
pub trait Transport {
    fn kind(&self) -> TransportKind;

    /// Pick up client settings before connecting.
    fn configure(&mut self, _config: &ClientConfig) {}

    /// Establish (or re-establish) the underlying connection.
    fn connect(&mut self) -> Result<()>;

    /// Tear the connection down. Safe to call more than once.
    fn shutdown(&mut self);

    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn configure(&mut self, config: &ClientConfig) {
        (**self).configure(config)
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
