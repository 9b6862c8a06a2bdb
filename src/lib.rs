//! # xim-client
//!
//! Client-side protocol engine for X Input Method servers.
//!
//! This crate lets an application talk to an input method server over the
//! XIM wire protocol: it discovers the server, runs the connect/open
//! handshake, negotiates the text encoding and extensions, and then manages
//! input contexts, forwarded key events, commits and preedit callbacks.
//!
//! ## Architecture
//!
//! - **Wire codec** ([`protocol`], [`codec`]): 4-byte framed messages in a
//!   byte order fixed at connect time
//! - **Transports** ([`transport`]): direct sockets, the display relay, and
//!   an in-memory peer
//! - **Session** ([`session`]): the handshake state machine, blocking
//!   request/reply calls, and the dispatch table for server-initiated frames
//! - **Attributes** ([`attr`]): schemas received at open time, typed value
//!   encoding, and validity modes
//!
//! The engine is single-threaded and blocking. It never installs a
//! `tracing` subscriber; diagnostics only appear if the application sets one up.
//!
//! ## Example
//!
//! ```no_run
//! use xim_client::attr::{names, style, AttrArg, AttrValue};
//! use xim_client::transport::{SocketAddress, SocketTransport};
//! use xim_client::Session;
//!
//! fn main() -> xim_client::Result<()> {
//!     let transport = SocketTransport::new(SocketAddress::Tcp {
//!         host: "localhost".into(),
//!         port: 9010,
//!     });
//!     let mut session = Session::builder()
//!         .locale("en_US.UTF-8")
//!         .transport(transport)
//!         .connect()?;
//!
//!     let ic = session.create_context(&[
//!         AttrArg::new(
//!             names::INPUT_STYLE,
//!             AttrValue::Card32(style::PREEDIT_NOTHING | style::STATUS_NOTHING),
//!         ),
//!         AttrArg::new(names::CLIENT_WINDOW, AttrValue::Window(0x1a00007)),
//!     ])?;
//!     session.set_focus(ic)?;
//!
//!     loop {
//!         session.pump()?;
//!         while let Some(commit) = session.lookup_commit(ic)? {
//!             println!("{:?}", commit.text.and_then(|t| t.to_utf8()));
//!         }
//!     }
//! }
//! ```

pub mod attr;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod error;
pub mod event;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod transport;

mod client;

pub use client::SessionBuilder;
pub use config::ClientConfig;
pub use error::{Result, XimError};
pub use session::{Session, SessionState};
