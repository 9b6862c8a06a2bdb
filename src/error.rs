//! Error types for xim-client.

use thiserror::Error;

use crate::attr::AttrType;
use crate::handler::ContextHandle;
use crate::protocol::{ErrorReport, ProtocolVersion};
use crate::session::SessionState;

/// Main error type for all engine operations.
#[derive(Debug, Error)]
pub enum XimError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Transport(#[from] std::io::Error),

    /// Peer closed the transport.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Not enough bytes buffered to read the requested field.
    #[error("Truncated frame")]
    Truncated,

    /// Frame does not fit the caller's scratch capacity.
    #[error("Frame of {required} bytes exceeds read buffer")]
    Overflow { required: usize },

    /// Payload too long for the 16-bit length field.
    #[error("Payload of {0} bytes does not fit in one frame")]
    PayloadTooLarge(usize),

    /// Well-formed frame that is not valid in the current state.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Peer answered with an `Error` frame.
    #[error("Server error: {0}")]
    ServerError(ErrorReport),

    /// Attribute name unknown to the schema or not usable in this mode.
    #[error("Cannot resolve attribute: {name}")]
    AttributeResolution { name: String },

    /// Attribute value has the wrong shape for its schema type.
    #[error("Attribute {name} expects a {expected:?} value")]
    AttributeValue { name: String, expected: AttrType },

    /// Encoded attributes did not fit; retry from `resume_at` with more room.
    #[error("Attribute buffer overflow at entry {resume_at}")]
    AttributeOverflow { resume_at: usize },

    /// Authentication rejected by either side.
    #[error("Authentication rejected")]
    AuthRejected,

    /// Server answered with a different protocol version.
    #[error("Protocol version mismatch: requested {requested}, received {received}")]
    VersionMismatch {
        requested: ProtocolVersion,
        received: ProtocolVersion,
    },

    /// No input method server matched the configuration.
    #[error("No input method server available: {0}")]
    NoServer(String),

    /// No registered transport could be configured.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Context handle not registered with this session.
    #[error("Unknown input context: {0:?}")]
    UnknownContext(ContextHandle),

    /// Operation not allowed in the current session state.
    #[error("{op} not allowed in state {state:?}")]
    InvalidState {
        state: SessionState,
        op: &'static str,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl XimError {
    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            XimError::Transport(_)
                | XimError::ConnectionClosed
                | XimError::AuthRejected
                | XimError::VersionMismatch { .. }
        )
    }

    /// Whether the transport itself failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, XimError::Transport(_) | XimError::ConnectionClosed)
    }
}

/// Result type alias using XimError.
pub type Result<T> = std::result::Result<T, XimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(XimError::ConnectionClosed.is_fatal());
        assert!(XimError::AuthRejected.is_fatal());
        assert!(!XimError::Truncated.is_fatal());
        assert!(!XimError::AttributeResolution {
            name: "clientWindow".into()
        }
        .is_fatal());
        assert!(!XimError::AttributeOverflow { resume_at: 2 }.is_fatal());
    }

    #[test]
    fn test_display_names_attribute() {
        let err = XimError::AttributeResolution {
            name: "bogus".into(),
        };
        assert!(err.to_string().contains("bogus"));
    }
}
