//! Stream socket transport.
//!
//! - Unix: Unix Domain Socket (`local/<path>` announcements)
//! - Any platform: TCP (`tcp/<host>:<port>` announcements)
//!
//! # Example
//!
//! ```no_run
//! use xim_client::transport::{SocketAddress, SocketTransport, Transport};
//!
//! let mut transport = SocketTransport::new(SocketAddress::Tcp {
//!     host: "localhost".into(),
//!     port: 9010,
//! });
//! transport.connect()?;
//! # Ok::<(), xim_client::XimError>(())
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::PathBuf;

use tracing::debug;

use super::{Transport, TransportKind};
use crate::error::{Result, XimError};

/// Where a socket transport connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Local(PathBuf),
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn open(address: &SocketAddress) -> Result<Self> {
        Ok(match address {
            SocketAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                stream.set_nodelay(true)?;
                Stream::Tcp(stream)
            }
            #[cfg(unix)]
            SocketAddress::Local(path) => Stream::Unix(UnixStream::connect(path)?),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(bytes),
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(bytes),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }

    fn shutdown(&mut self) {
        let _ = match self {
            Stream::Tcp(s) => s.shutdown(std::net::Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(std::net::Shutdown::Both),
        };
    }
}

/// Direct stream socket binding.
pub struct SocketTransport {
    address: SocketAddress,
    stream: Option<Stream>,
}

impl SocketTransport {
    pub fn new(address: SocketAddress) -> Self {
        Self {
            address,
            stream: None,
        }
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    fn stream(&mut self) -> Result<&mut Stream> {
        self.stream.as_mut().ok_or(XimError::ConnectionClosed)
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn connect(&mut self) -> Result<()> {
        self.shutdown();
        debug!(address = ?self.address, "connecting socket transport");
        self.stream = Some(Stream::open(&self.address)?);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown();
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        // write_all retries short writes and EINTR internally
        self.stream()?.write_all(bytes)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream()?;
        loop {
            match stream.read(buf) {
                Ok(0) => return Err(XimError::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.stream()?.flush()?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_unconnected_operations_fail() {
        let mut transport = SocketTransport::new(SocketAddress::Tcp {
            host: "127.0.0.1".into(),
            port: 1,
        });
        assert!(!transport.is_connected());
        assert!(matches!(transport.write(b"x"), Err(XimError::ConnectionClosed)));
        let mut buf = [0u8; 4];
        assert!(matches!(transport.read(&mut buf), Err(XimError::ConnectionClosed)));
    }

    #[test]
    fn test_tcp_roundtrip_and_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut transport = SocketTransport::new(SocketAddress::Tcp {
            host: "127.0.0.1".into(),
            port,
        });
        transport.connect().unwrap();
        transport.write(&[1, 2, 3, 4]).unwrap();
        transport.flush().unwrap();

        let mut got = Vec::new();
        let mut buf = [0u8; 8];
        while got.len() < 4 {
            let n = transport.read(&mut buf).unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, vec![1, 2, 3, 4]);

        server.join().unwrap();
        assert!(matches!(transport.read(&mut buf), Err(XimError::ConnectionClosed)));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_socket_connects() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xim.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut transport = SocketTransport::new(SocketAddress::Local(path));
        transport.connect().unwrap();
        let (_peer, _) = listener.accept().unwrap();
        assert!(transport.is_connected());
        transport.shutdown();
        assert!(!transport.is_connected());
    }
}
