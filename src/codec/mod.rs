//! Codec module - payload field serialization.
//!
//! - [`WireWriter`] - builds payloads in the session byte order
//! - [`WireReader`] - bounds-checked cursor over received payloads
//!
//! Codecs are plain structs rather than trait objects; the byte order is a
//! runtime value negotiated per session.

mod wire;

pub use wire::{WireReader, WireWriter};
