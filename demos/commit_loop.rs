//! Commit loop - one input context receiving committed text.
//!
//! This example demonstrates:
//! - Building a session with the builder pattern
//! - Creating an input context with an input style and client window
//! - Pumping unsolicited server traffic and looking up the commit
//!
//! The server side is a scripted [`MemoryPeer`] answering the handshake, so
//! the example runs without a display:
//!
//! ```text
//! cargo run --example commit_loop
//! ```

use xim_client::attr::{names, style, AttrArg, AttrEntry, AttrType, AttrValue, Schema};
use xim_client::codec::WireWriter;
use xim_client::config::ByteOrder;
use xim_client::protocol::{flags, opcodes, Endian, Frame};
use xim_client::transport::{MemoryPeer, MemoryTransport};
use xim_client::Session;

const IMID: u16 = 1;
const ICID: u16 = 1;

fn writer() -> WireWriter {
    WireWriter::new(Endian::Little)
}

fn ids(imid: u16, icid: u16) -> Vec<u8> {
    let mut w = writer();
    w.put_u16(imid);
    w.put_u16(icid);
    w.as_slice().to_vec()
}

/// Open reply announcing a small IM and IC attribute table.
fn open_reply() -> xim_client::Result<Vec<u8>> {
    let mut im = writer();
    Schema::write_entries(
        &mut im,
        &[AttrEntry::new(1, AttrType::Styles, names::QUERY_INPUT_STYLE)],
    )?;
    let mut ic = writer();
    Schema::write_entries(
        &mut ic,
        &[
            AttrEntry::new(0, AttrType::Separator, names::SEPARATOR),
            AttrEntry::new(1, AttrType::Card32, names::INPUT_STYLE),
            AttrEntry::new(2, AttrType::Window, names::CLIENT_WINDOW),
        ],
    )?;

    let mut w = writer();
    w.put_u16(IMID);
    w.put_len_u16(im.len())?;
    w.put_bytes(im.as_slice());
    w.put_len_u16(ic.len())?;
    w.put_u16(0);
    w.put_bytes(ic.as_slice());
    Ok(w.as_slice().to_vec())
}

/// Answer the requests a session sends while it connects and creates a context.
fn serve(peer: &MemoryPeer) -> xim_client::Result<()> {
    let open = open_reply()?;
    peer.set_responder(move |frame: &Frame| match frame.major() {
        opcodes::CONNECT => vec![(opcodes::CONNECT_REPLY, vec![1, 0, 0, 0])],
        opcodes::OPEN => vec![(opcodes::OPEN_REPLY, open.clone())],
        opcodes::ENCODING_NEGOTIATION => {
            let mut w = writer();
            w.put_u16(IMID);
            w.put_u16(0);
            w.put_i16(0);
            w.put_u16(0);
            vec![(opcodes::ENCODING_NEGOTIATION_REPLY, w.as_slice().to_vec())]
        }
        opcodes::QUERY_EXTENSION => vec![(opcodes::QUERY_EXTENSION_REPLY, ids(IMID, 0))],
        opcodes::CREATE_IC => vec![(opcodes::CREATE_IC_REPLY, ids(IMID, ICID))],
        opcodes::CLOSE => vec![(opcodes::CLOSE_REPLY, ids(IMID, 0))],
        opcodes::DISCONNECT => vec![(opcodes::DISCONNECT_REPLY, Vec::new())],
        _ => Vec::new(),
    });
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, peer) = MemoryTransport::pair(Endian::Little);
    serve(&peer)?;

    let mut session = Session::builder()
        .locale("en_US.UTF-8")
        .byte_order(ByteOrder::Little)
        .encodings(["COMPOUND_TEXT"])
        .transport(transport)
        .connect()?;
    println!("session ready, imid {:?}", session.imid());

    let ic = session.create_context(&[
        AttrArg::new(
            names::INPUT_STYLE,
            AttrValue::Card32(style::PREEDIT_NOTHING | style::STATUS_NOTHING),
        ),
        AttrArg::new(names::CLIENT_WINDOW, AttrValue::Window(0x0040_0001)),
    ])?;

    // The server commits two strings without being asked.
    for text in [b"hello".as_slice(), b"world".as_slice()] {
        let mut commit = writer();
        commit.put_u16(IMID);
        commit.put_u16(ICID);
        commit.put_u16(flags::LOOKUP_CHARS);
        commit.put_string8_u16(text)?;
        peer.push_frame(opcodes::COMMIT, commit.as_slice())?;
    }

    for _ in 0..2 {
        session.pump()?;
    }
    while let Some(record) = session.lookup_commit(ic)? {
        let text = record.text.and_then(|t| t.to_utf8()).unwrap_or_default();
        println!("{}: committed {:?}", ic, text);
    }

    session.disconnect()?;
    Ok(())
}
