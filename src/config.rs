//! Client configuration.
//!
//! Loaded from JSON; every field has a default so a partial document (or
//! `{}`) is valid.
//!
//! # Example
//!
//! ```
//! use xim_client::config::ClientConfig;
//!
//! let mut config = ClientConfig::from_json_str(r#"{ "locale": "ja_JP.eucJP" }"#).unwrap();
//! config.apply_modifiers("@im=kinput2");
//! assert_eq!(config.server_name.as_deref(), Some("kinput2"));
//! assert_eq!(config.read_buffer_size, 2048);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{Endian, ProtocolVersion, BUFSIZE};

/// Byte order announced at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    pub fn resolve(self) -> Endian {
        match self {
            ByteOrder::Native => Endian::native(),
            ByteOrder::Little => Endian::Little,
            ByteOrder::Big => Endian::Big,
        }
    }
}

/// Default per-message bound of the display relay.
pub const DEFAULT_RELAY_MESSAGE_BOUND: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub locale: String,
    /// Connect only to this server.
    pub server_name: Option<String>,
    /// Transport names, most preferred first.
    pub transport_priority: Vec<String>,
    pub protocol_version: ProtocolVersion,
    pub byte_order: ByteOrder,
    /// Encodings to propose; empty derives them from the locale.
    pub encodings: Vec<String>,
    /// Keep the session across a dropped transport.
    pub reconnectable: bool,
    /// Initial scratch capacity of the message reader.
    pub read_buffer_size: usize,
    /// Inline message bound of the display relay when the server states none.
    pub relay_message_bound: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            locale: "C".to_string(),
            server_name: None,
            transport_priority: vec!["local".into(), "tcp".into(), "X".into()],
            protocol_version: ProtocolVersion::V1_0,
            byte_order: ByteOrder::Native,
            encodings: Vec::new(),
            reconnectable: false,
            read_buffer_size: BUFSIZE,
            relay_message_bound: DEFAULT_RELAY_MESSAGE_BOUND,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply a modifier list such as `@im=fcitx@other=x`.
    ///
    /// Only `im` is understood; `@im=none` clears the server name.
    pub fn apply_modifiers(&mut self, modifiers: &str) {
        for part in modifiers.split('@').filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            if key == "im" {
                self.server_name = match value {
                    "" | "none" => None,
                    name => Some(name.to_string()),
                };
            }
        }
    }

    pub fn endian(&self) -> Endian {
        self.byte_order.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.transport_priority, vec!["local", "tcp", "X"]);
        assert_eq!(config.relay_message_bound, 20);
        assert_eq!(config.protocol_version, ProtocolVersion::V1_0);
    }

    #[test]
    fn test_partial_document() {
        let config = ClientConfig::from_json_str(
            r#"{ "byte_order": "big", "reconnectable": true, "encodings": ["UTF-8"] }"#,
        )
        .unwrap();
        assert_eq!(config.endian(), Endian::Big);
        assert!(config.reconnectable);
        assert_eq!(config.encodings, vec!["UTF-8"]);
        assert_eq!(config.locale, "C");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ClientConfig::from_json_str("{ locale: 1 }").unwrap_err();
        assert!(matches!(err, crate::XimError::Config(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "locale": "en_US.UTF-8", "server_name": "fcitx" }}"#).unwrap();
        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(config.locale, "en_US.UTF-8");
        assert_eq!(config.server_name.as_deref(), Some("fcitx"));
    }

    #[test]
    fn test_modifiers() {
        let mut config = ClientConfig::default();
        config.apply_modifiers("@foo=bar@im=ibus");
        assert_eq!(config.server_name.as_deref(), Some("ibus"));
        config.apply_modifiers("@im=none");
        assert_eq!(config.server_name, None);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = ClientConfig::default();
        config.byte_order = ByteOrder::Little;
        let json = config.to_json().unwrap();
        assert!(json.contains("\"little\""));
        assert_eq!(ClientConfig::from_json_str(&json).unwrap(), config);
    }
}
