//! Server discovery and transport selection.
//!
//! Servers announce themselves through three kinds of strings published on
//! the display:
//!
//! ```text
//! @server=<name>
//! @locale=<locale>,<locale>,...
//! @transport=X/,tcp/<host>:<port>,local/<path>
//! ```
//!
//! The display library that reads those strings is external; it is
//! consumed through [`ServerDirectory`]. Transport bindings are chosen from
//! a [`TransportRegistry`] in the client's priority order, with the display
//! relay `X` always present as the fallback.

use tracing::{debug, warn};

use super::{SocketAddress, SocketTransport, Transport};
use crate::error::{Result, XimError};

const SERVER_PREFIX: &str = "@server=";
const LOCALE_PREFIX: &str = "@locale=";
const TRANSPORT_PREFIX: &str = "@transport=";

/// Name of the display-relay transport.
pub const RELAY_TRANSPORT: &str = "X";

/// Host-side access to the server announcements.
pub trait ServerDirectory {
    /// Every `@server=` announcement currently published.
    fn servers(&mut self) -> Result<Vec<String>>;

    /// The `@locale=` announcement of `server`.
    fn locales(&mut self, server: &str) -> Result<String>;

    /// The `@transport=` announcement of `server`.
    fn transports(&mut self, server: &str) -> Result<String>;
}

/// One entry of a `@transport=` announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAddress {
    pub name: String,
    pub address: String,
}

impl TransportAddress {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
        }
    }
}

/// Extract server names from `@server=` announcements.
pub fn parse_servers(announcements: &[String]) -> Vec<String> {
    announcements
        .iter()
        .filter_map(|a| a.strip_prefix(SERVER_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Names tried when matching a locale: `lang_terr.codeset`, `lang.codeset`,
/// `lang_terr`, `lang`.
pub fn locale_candidates(locale: &str) -> Vec<String> {
    let (base, codeset) = match locale.split_once('.') {
        Some((base, codeset)) => (base, Some(codeset)),
        None => (locale, None),
    };
    let base = base.split('@').next().unwrap_or(base);
    let lang = base.split('_').next().unwrap_or(base);

    let mut out = Vec::new();
    let mut add = |s: String| {
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    };
    if let Some(codeset) = codeset {
        add(format!("{}.{}", base, codeset));
        add(format!("{}.{}", lang, codeset));
    }
    add(base.to_string());
    add(lang.to_string());
    out
}

/// Whether a `@locale=` announcement covers `locale`.
pub fn locale_supported(announcement: &str, locale: &str) -> bool {
    let list = match announcement.strip_prefix(LOCALE_PREFIX) {
        Some(list) => list,
        None => return false,
    };
    let offered: Vec<&str> = list.split(',').map(str::trim).collect();
    locale_candidates(locale)
        .iter()
        .any(|candidate| offered.iter().any(|o| o == candidate))
}

/// Parse a `@transport=` announcement.
pub fn parse_transports(announcement: &str) -> Vec<TransportAddress> {
    let list = match announcement.strip_prefix(TRANSPORT_PREFIX) {
        Some(list) => list,
        None => return Vec::new(),
    };
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('/') {
            Some((name, address)) => TransportAddress::new(name, address),
            None => TransportAddress::new(entry, ""),
        })
        .collect()
}

/// Pick the first server that matches the configured name (if any) and
/// offers `locale`, returning its name and announced transports.
pub fn choose_server(
    directory: &mut dyn ServerDirectory,
    server_name: Option<&str>,
    locale: &str,
) -> Result<(String, Vec<TransportAddress>)> {
    let servers = parse_servers(&directory.servers()?);
    for server in servers {
        if let Some(wanted) = server_name {
            if wanted != server {
                continue;
            }
        }
        if !locale_supported(&directory.locales(&server)?, locale) {
            debug!(server = %server, locale, "server does not offer locale");
            continue;
        }
        let transports = parse_transports(&directory.transports(&server)?);
        return Ok((server, transports));
    }
    Err(XimError::NoServer(match server_name {
        Some(name) => format!("{} for locale {}", name, locale),
        None => format!("any server for locale {}", locale),
    }))
}

type Configurator = Box<dyn Fn(&TransportAddress) -> Result<Box<dyn Transport>>>;

/// Ordered set of `(name, configurator)` pairs.
pub struct TransportRegistry {
    entries: Vec<(String, Configurator)>,
}

impl TransportRegistry {
    /// Registry holding only the display relay.
    pub fn new<F>(relay: F) -> Self
    where
        F: Fn(&TransportAddress) -> Result<Box<dyn Transport>> + 'static,
    {
        Self {
            entries: vec![(RELAY_TRANSPORT.to_string(), Box::new(relay))],
        }
    }

    /// Registry with the relay plus the `tcp` and `local` socket bindings.
    pub fn with_sockets<F>(relay: F) -> Self
    where
        F: Fn(&TransportAddress) -> Result<Box<dyn Transport>> + 'static,
    {
        let mut registry = Self::new(relay);
        registry.register("tcp", |addr| {
            Ok(Box::new(SocketTransport::new(parse_tcp(&addr.address)?)) as Box<dyn Transport>)
        });
        #[cfg(unix)]
        registry.register("local", |addr| {
            if addr.address.is_empty() {
                return Err(XimError::UnsupportedTransport("local/".to_string()));
            }
            Ok(Box::new(SocketTransport::new(SocketAddress::Local(
                addr.address.clone().into(),
            ))) as Box<dyn Transport>)
        });
        registry
    }

    /// Add or replace a binding.
    pub fn register<F>(&mut self, name: &str, configurator: F)
    where
        F: Fn(&TransportAddress) -> Result<Box<dyn Transport>> + 'static,
    {
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), Box::new(configurator)));
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn configurator(&self, name: &str) -> Option<&Configurator> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Configure the first binding in `priority` that the server announced,
    /// falling back to the display relay.
    pub fn select(
        &self,
        priority: &[String],
        announced: &[TransportAddress],
    ) -> Result<Box<dyn Transport>> {
        for name in priority {
            let Some(configure) = self.configurator(name) else {
                continue;
            };
            let Some(address) = announced.iter().find(|a| &a.name == name) else {
                continue;
            };
            match configure(address) {
                Ok(transport) => {
                    debug!(transport = %name, address = %address.address, "transport chosen");
                    return Ok(transport);
                }
                Err(e) => warn!(transport = %name, error = %e, "transport configuration failed"),
            }
        }

        let relay_address = announced
            .iter()
            .find(|a| a.name == RELAY_TRANSPORT)
            .cloned()
            .unwrap_or_else(|| TransportAddress::new(RELAY_TRANSPORT, ""));
        match self.configurator(RELAY_TRANSPORT) {
            Some(configure) => configure(&relay_address),
            None => Err(XimError::UnsupportedTransport(RELAY_TRANSPORT.to_string())),
        }
    }
}

fn parse_tcp(address: &str) -> Result<SocketAddress> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| XimError::UnsupportedTransport(format!("tcp/{}", address)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| XimError::UnsupportedTransport(format!("tcp/{}", address)))?;
    Ok(SocketAddress::Tcp {
        host: host.to_string(),
        port,
    })
}
