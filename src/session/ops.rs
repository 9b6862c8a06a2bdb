//! IM and IC operations.
//!
//! Every operation is one request followed by its reply predicate:
//!
//! ```text
//! SetIMValues:  imid | bytes u16 | triples          -> SetIMValuesReply
//! GetIMValues:  imid | bytes u16 | ids | pad        -> imid | bytes u16 | triples
//! CreateIC:     imid | bytes u16 | triples          -> imid | icid
//! SetICValues:  imid | icid | bytes u16 | unused u16 | triples
//! GetICValues:  imid | icid | bytes u16 | ids | pad -> imid | icid | bytes u16 | unused | triples
//! ResetIC:      imid | icid                         -> imid | icid | len u16 | string
//! TriggerNotify: imid | icid | flag u32 | index u32 | mask u32
//! ```
//!
//! Sets stop at the first attribute that cannot be resolved: the entries
//! before it are still sent and applied, then the failing name is
//! returned. A context create is all-or-nothing.

use tracing::{debug, trace};

use super::{ExtensionKind, ReplyMatch, Session, SessionState};
use crate::attr::{
    decode_attributes, encode_attributes, encode_query_ids, names, AttrArg, AttrEntry, AttrQuery,
    AttrTarget, AttrValue, Check, ModeMap, Nest, Operation, Point, QuarkSet, QuarkTable, Schema,
    ValueStore,
};
use crate::codec::WireWriter;
use crate::encoding::EncodedText;
use crate::error::{Result, XimError};
use crate::event::KeyEvent;
use crate::handler::{ContextBackend, ContextCore, ContextHandle, ContextTarget, InputContext};
use crate::protocol::{flags, opcodes, BUFSIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Attribute owner for IM-level operations.
struct ImTarget<'a> {
    modes: &'a ModeMap,
    values: &'a mut ValueStore,
    saved: &'a mut QuarkSet,
    quarks: &'a mut QuarkTable,
    im_schema: &'a Schema,
    ic_schema: &'a Schema,
    op: Operation,
    record_saved: bool,
}

impl AttrTarget for ImTarget<'_> {
    fn check(&self, entry: &AttrEntry, _nest: Nest) -> Check {
        self.modes.check_im(&entry.name, self.op)
    }

    fn commit(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()> {
        let quark = self.quarks.intern(&entry.name);
        self.values.set(nest, quark, value.clone());
        if self.record_saved {
            self.saved.insert(quark);
        }
        Ok(())
    }

    fn set_inner(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()> {
        let quark = self.quarks.intern(&entry.name);
        self.values.set(nest, quark, value.clone());
        Ok(())
    }

    fn get_inner(&self, entry: &AttrEntry, nest: Nest) -> Result<AttrValue> {
        match entry.name.as_str() {
            names::QUERY_IM_VALUES_LIST => Ok(AttrValue::ValuesList(self.im_schema.names())),
            names::QUERY_IC_VALUES_LIST => Ok(AttrValue::ValuesList(self.ic_schema.names())),
            name => self
                .quarks
                .lookup(name)
                .and_then(|q| self.values.get(nest, q))
                .cloned()
                .ok_or_else(|| XimError::AttributeResolution {
                    name: name.to_string(),
                }),
        }
    }
}

/// Encode `args` after whatever `w` already holds, doubling the payload
/// limit whenever an entry does not fit.
///
/// Returns the resolution failure that stopped the batch, if any; the
/// entries before it stay encoded.
fn encode_growing(
    schema: &Schema,
    args: &[AttrArg],
    w: &mut WireWriter,
    target: &mut dyn AttrTarget,
) -> Result<Option<XimError>> {
    let mut limit = BUFSIZE - HEADER_SIZE;
    let mut start = 0;
    loop {
        match encode_attributes(schema, args, start, limit, w, target) {
            Ok(()) => return Ok(None),
            Err(XimError::AttributeOverflow { resume_at }) => {
                if limit >= MAX_PAYLOAD_SIZE {
                    return Err(XimError::PayloadTooLarge(w.len()));
                }
                limit = (limit * 2).min(MAX_PAYLOAD_SIZE);
                start = resume_at;
                trace!(limit, resume_at, "attribute buffer grown");
            }
            Err(e @ XimError::AttributeResolution { .. })
            | Err(e @ XimError::AttributeValue { .. }) => return Ok(Some(e)),
            Err(e) => return Err(e),
        }
    }
}

/// Patch a `u16` byte count reserved at `at`, covering everything after `from`.
pub(super) fn patch_len(w: &mut WireWriter, at: usize, from: usize) -> Result<usize> {
    let bytes = w.len() - from;
    let len = u16::try_from(bytes).map_err(|_| XimError::PayloadTooLarge(bytes))?;
    w.patch_u16(at, len);
    Ok(bytes)
}

/// Answer a get from values held locally.
fn local_values(
    core: &ContextCore,
    quarks: &QuarkTable,
    queries: &[AttrQuery],
    nest: Nest,
) -> Result<Vec<AttrArg>> {
    let mut out = Vec::with_capacity(queries.len());
    for query in queries {
        let value = match query {
            AttrQuery::Value(name) => quarks
                .lookup(name)
                .and_then(|q| core.values.get(nest, q))
                .cloned(),
            AttrQuery::Group(name, inner) => {
                let inner_nest = match name.as_str() {
                    names::PREEDIT_ATTRIBUTES => Nest::Preedit,
                    names::STATUS_ATTRIBUTES => Nest::Status,
                    _ => Nest::Top,
                };
                Some(AttrValue::Nested(local_values(
                    core, quarks, inner, inner_nest,
                )?))
            }
        };
        let value = value.ok_or_else(|| XimError::AttributeResolution {
            name: query.name().to_string(),
        })?;
        out.push(AttrArg::new(query.name(), value));
    }
    Ok(out)
}

impl Session {
    /// Run the IM-level encoder over `args` with the session's stores.
    fn encode_im(
        &mut self,
        args: &[AttrArg],
        op: Operation,
        record_saved: bool,
        w: &mut WireWriter,
    ) -> Result<Option<XimError>> {
        let Session {
            im_schema,
            ic_schema,
            im_modes,
            im_values,
            im_saved,
            quarks,
            ..
        } = self;
        let mut target = ImTarget {
            modes: im_modes,
            values: im_values,
            saved: im_saved,
            quarks,
            im_schema,
            ic_schema,
            op,
            record_saved,
        };
        encode_growing(im_schema, args, w, &mut target)
    }

    /// Run the IC-level encoder over `args` for `handle`.
    fn encode_ic(
        &mut self,
        handle: ContextHandle,
        args: &[AttrArg],
        op: Operation,
        record_saved: bool,
        w: &mut WireWriter,
    ) -> Result<Option<XimError>> {
        let Session {
            ic_schema,
            quarks,
            contexts,
            ..
        } = self;
        let core = &mut contexts.get_mut(handle)?.core;
        let target = ContextTarget::new(core, quarks, op);
        let mut target = if record_saved {
            target.recording()
        } else {
            target
        };
        encode_growing(ic_schema, args, w, &mut target)
    }

    /// Whether a disconnected session must keep a change locally because
    /// the server cannot be reached again.
    fn stays_offline(&mut self) -> bool {
        if self.state != SessionState::Disconnected {
            return false;
        }
        match self.reconnect() {
            Ok(()) => false,
            Err(e) => {
                debug!(error = %e, "reconnect failed, keeping change locally");
                true
            }
        }
    }

    /// Read IM-level attributes.
    pub fn get_im_values(&mut self, queries: &[AttrQuery]) -> Result<Vec<AttrArg>> {
        self.guarded("get_im_values", |s| {
            let imid = s.require_imid("get_im_values")?;
            let endian = s.endian;
            let mut w = WireWriter::new(endian);
            w.put_u16(imid);
            let len_at = w.reserve_u16();

            let Session {
                im_schema,
                ic_schema,
                im_modes,
                im_values,
                im_saved,
                quarks,
                ..
            } = s;
            let mut target = ImTarget {
                modes: im_modes,
                values: im_values,
                saved: im_saved,
                quarks,
                im_schema,
                ic_schema,
                op: Operation::Get,
                record_saved: false,
            };
            encode_query_ids(im_schema, queries, &mut w, &target)?;
            let bytes = patch_len(&mut w, len_at, 4)?;
            w.pad_to_4();
            if bytes == 0 {
                // Only inner attributes were asked for.
                return decode_attributes(im_schema, queries, &[], endian, &mut target);
            }

            let frame = s.call(
                opcodes::GET_IM_VALUES,
                w.as_slice(),
                ReplyMatch::session(opcodes::GET_IM_VALUES_REPLY, imid),
            )?;
            let mut r = frame.reader(endian);
            r.skip(2)?;
            let bytes = r.get_u16()? as usize;
            let data = r.get_bytes(bytes.min(r.remaining()))?;

            let Session {
                im_schema,
                ic_schema,
                im_modes,
                im_values,
                im_saved,
                quarks,
                ..
            } = s;
            let mut target = ImTarget {
                modes: im_modes,
                values: im_values,
                saved: im_saved,
                quarks,
                im_schema,
                ic_schema,
                op: Operation::Get,
                record_saved: false,
            };
            decode_attributes(im_schema, queries, data, endian, &mut target)
        })
    }

    /// Set IM-level attributes.
    pub fn set_im_values(&mut self, args: &[AttrArg]) -> Result<()> {
        if self.stays_offline() {
            let mut scratch = WireWriter::new(self.endian);
            return match self.encode_im(args, Operation::Set, true, &mut scratch)? {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        self.guarded("set_im_values", |s| {
            let imid = s.require_imid("set_im_values")?;
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            let len_at = w.reserve_u16();
            let failure = s.encode_im(args, Operation::Set, false, &mut w)?;
            let bytes = patch_len(&mut w, len_at, 4)?;

            if bytes > 0 || failure.is_none() {
                s.call(
                    opcodes::SET_IM_VALUES,
                    w.as_slice(),
                    ReplyMatch::session(opcodes::SET_IM_VALUES_REPLY, imid),
                )?;
            }
            failure.map_or(Ok(()), Err)
        })
    }

    /// Create an input context; `args` must carry `inputStyle`.
    pub fn create_context(&mut self, args: &[AttrArg]) -> Result<ContextHandle> {
        let style = args
            .iter()
            .find(|a| a.name == names::INPUT_STYLE)
            .and_then(|a| a.value.as_u32())
            .ok_or_else(|| XimError::AttributeResolution {
                name: names::INPUT_STYLE.to_string(),
            })?;

        if self.stays_offline() {
            let mut scratch = WireWriter::new(self.endian);
            let handle = self.prepare_context(style, args, true, &mut scratch)?;
            debug!(context = %handle, "context deferred until reconnect");
            return Ok(handle);
        }

        self.guarded("create_context", |s| {
            let imid = s.require_imid("create_context")?;
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            let len_at = w.reserve_u16();
            let handle = s.prepare_context(style, args, false, &mut w)?;
            let sent = patch_len(&mut w, len_at, 4).and_then(|_| {
                s.call(
                    opcodes::CREATE_IC,
                    w.as_slice(),
                    ReplyMatch::session(opcodes::CREATE_IC_REPLY, imid),
                )
            });
            let frame = match sent {
                Ok(frame) => frame,
                Err(e) => {
                    s.contexts.remove(handle)?;
                    return Err(e);
                }
            };

            let mut r = frame.reader(s.endian);
            r.skip(2)?;
            let icid = r.get_u16()?;
            s.contexts.get_mut(handle)?.backend = ContextBackend::Remote { icid };
            debug!(context = %handle, icid, "context created");
            Ok(handle)
        })
    }

    /// Register a deferred context and encode its create attributes into
    /// `w`; the context is dropped again if any attribute fails.
    fn prepare_context(
        &mut self,
        style: u32,
        args: &[AttrArg],
        record_saved: bool,
        w: &mut WireWriter,
    ) -> Result<ContextHandle> {
        let mut core = ContextCore::new(style);
        core.masks = self.default_masks;
        let handle = self
            .contexts
            .insert(InputContext::new(core, ContextBackend::Deferred));

        let failure = match self.encode_ic(handle, args, Operation::Create, record_saved, w) {
            Ok(None) => self
                .contexts
                .get(handle)?
                .core
                .modes
                .missing_create()
                .map(|name| XimError::AttributeResolution {
                    name: name.to_string(),
                }),
            Ok(Some(e)) | Err(e) => Some(e),
        };
        if let Some(e) = failure {
            self.contexts.remove(handle)?;
            return Err(e);
        }
        Ok(handle)
    }

    /// Destroy a context. A context the server does not know is dropped
    /// locally.
    pub fn destroy_context(&mut self, handle: ContextHandle) -> Result<()> {
        if self.contexts.get(handle)?.icid().is_none() {
            self.contexts.remove(handle)?;
            return Ok(());
        }
        self.guarded("destroy_context", |s| {
            let (imid, icid) = s.context_ids(handle, "destroy_context")?;
            let payload = id_pair(s, imid, icid);
            let result = s.call(
                opcodes::DESTROY_IC,
                &payload,
                ReplyMatch::context(opcodes::DESTROY_IC_REPLY, imid, icid),
            );
            if result.is_ok() {
                s.contexts.remove(handle)?;
                debug!(context = %handle, "context destroyed");
            }
            result.map(|_| ())
        })
    }

    /// Set IC-level attributes.
    pub fn set_ic_values(&mut self, handle: ContextHandle, args: &[AttrArg]) -> Result<()> {
        if self.stays_offline() {
            let mut scratch = WireWriter::new(self.endian);
            return match self.encode_ic(handle, args, Operation::Set, true, &mut scratch)? {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        self.guarded("set_ic_values", |s| {
            let (imid, icid) = s.context_ids(handle, "set_ic_values")?;
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            w.put_u16(icid);
            let len_at = w.reserve_u16();
            w.put_u16(0);
            let failure = s.encode_ic(handle, args, Operation::Set, false, &mut w)?;
            let bytes = patch_len(&mut w, len_at, 8)?;

            if bytes > 0 || failure.is_none() {
                s.call(
                    opcodes::SET_IC_VALUES,
                    w.as_slice(),
                    ReplyMatch::context(opcodes::SET_IC_VALUES_REPLY, imid, icid),
                )?;
            }
            failure.map_or(Ok(()), Err)
        })
    }

    /// Read IC-level attributes. While the server is unreachable the
    /// values kept locally are returned.
    pub fn get_ic_values(
        &mut self,
        handle: ContextHandle,
        queries: &[AttrQuery],
    ) -> Result<Vec<AttrArg>> {
        if self.stays_offline() {
            let core = &self.contexts.get(handle)?.core;
            return local_values(core, &self.quarks, queries, Nest::Top);
        }
        self.guarded("get_ic_values", |s| {
            let (imid, icid) = s.context_ids(handle, "get_ic_values")?;
            let endian = s.endian;
            let mut w = WireWriter::new(endian);
            w.put_u16(imid);
            w.put_u16(icid);
            let len_at = w.reserve_u16();
            {
                let Session {
                    ic_schema,
                    quarks,
                    contexts,
                    ..
                } = &mut *s;
                let core = &mut contexts.get_mut(handle)?.core;
                let target = ContextTarget::new(core, quarks, Operation::Get);
                encode_query_ids(ic_schema, queries, &mut w, &target)?;
            }
            patch_len(&mut w, len_at, 6)?;
            w.pad_to_4();

            let frame = s.call(
                opcodes::GET_IC_VALUES,
                w.as_slice(),
                ReplyMatch::context(opcodes::GET_IC_VALUES_REPLY, imid, icid),
            )?;
            let mut r = frame.reader(endian);
            r.skip(4)?;
            let bytes = r.get_u16()? as usize;
            r.skip(2)?;
            let data = r.get_bytes(bytes.min(r.remaining()))?;

            let Session {
                ic_schema,
                quarks,
                contexts,
                ..
            } = s;
            let core = &mut contexts.get_mut(handle)?.core;
            let mut target = ContextTarget::new(core, quarks, Operation::Get);
            decode_attributes(ic_schema, queries, data, endian, &mut target)
        })
    }

    pub fn set_focus(&mut self, handle: ContextHandle) -> Result<()> {
        self.guarded("set_focus", |s| {
            let (imid, icid) = s.context_ids(handle, "set_focus")?;
            let payload = id_pair(s, imid, icid);
            s.send(opcodes::SET_IC_FOCUS, 0, &payload)
        })
    }

    pub fn unset_focus(&mut self, handle: ContextHandle) -> Result<()> {
        self.guarded("unset_focus", |s| {
            let (imid, icid) = s.context_ids(handle, "unset_focus")?;
            let payload = id_pair(s, imid, icid);
            s.send(opcodes::UNSET_IC_FOCUS, 0, &payload)
        })
    }

    /// Reset the context, returning the preedit text the server committed.
    pub fn reset_context(&mut self, handle: ContextHandle) -> Result<Option<EncodedText>> {
        self.guarded("reset_context", |s| {
            let (imid, icid) = s.context_ids(handle, "reset_context")?;
            let payload = id_pair(s, imid, icid);
            let frame = s.call(
                opcodes::RESET_IC,
                &payload,
                ReplyMatch::context(opcodes::RESET_IC_REPLY, imid, icid),
            )?;
            let mut r = frame.reader(s.endian);
            r.skip(4)?;
            let len = r.get_u16()? as usize;
            if len == 0 {
                return Ok(None);
            }
            let bytes = r.get_bytes(len)?.to_vec();
            Ok(Some(EncodedText::new(s.text_encoding(), bytes)))
        })
    }

    /// Forward a key event to the server. A synchronous forward waits for
    /// the server's sync reply.
    pub fn forward_event(
        &mut self,
        handle: ContextHandle,
        event: &KeyEvent,
        synchronous: bool,
    ) -> Result<()> {
        self.guarded("forward_event", |s| {
            let (imid, icid) = s.context_ids(handle, "forward_event")?;
            let flag = if synchronous { flags::SYNCHRONOUS } else { 0 };
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            w.put_u16(icid);
            w.put_u16(flag);

            match s.extensions.get(ExtensionKind::ForwardKeyEvent) {
                Some(ext) => {
                    let (major, minor) = (ext.major, ext.minor);
                    w.put_u16(event.sequence);
                    w.put_u8(event.kind);
                    w.put_u8(event.keycode);
                    w.put_u16(event.state);
                    w.put_u32(event.time);
                    w.put_u32(event.window);
                    s.send(major, minor, w.as_slice())?;
                }
                None => {
                    w.put_u16(0);
                    event.encode(&mut w);
                    s.send(opcodes::FORWARD_EVENT, 0, w.as_slice())?;
                }
            }
            trace!(context = %handle, keycode = event.keycode, synchronous, "event forwarded");

            if synchronous {
                s.await_reply(ReplyMatch::context(opcodes::SYNC_REPLY, imid, icid))?;
            }
            Ok(())
        })
    }

    /// Sync barrier: returns once the server has processed everything sent
    /// on this context so far.
    pub fn sync(&mut self, handle: ContextHandle) -> Result<()> {
        self.guarded("sync", |s| {
            let (imid, icid) = s.context_ids(handle, "sync")?;
            let payload = id_pair(s, imid, icid);
            s.call(
                opcodes::SYNC,
                &payload,
                ReplyMatch::context(opcodes::SYNC_REPLY, imid, icid),
            )
            .map(|_| ())
        })
    }

    /// Tell the server trigger key `index` of the on (or off) list was pressed.
    pub fn trigger_notify(&mut self, handle: ContextHandle, on: bool, index: u32) -> Result<()> {
        self.guarded("trigger_notify", |s| {
            let (imid, icid) = s.context_ids(handle, "trigger_notify")?;
            let mask = s.contexts.get(handle)?.core.masks.select;
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            w.put_u16(icid);
            w.put_u32(if on { 0 } else { 1 });
            w.put_u32(index);
            w.put_u32(mask);
            s.call(
                opcodes::TRIGGER_NOTIFY,
                w.as_slice(),
                ReplyMatch::context(opcodes::TRIGGER_NOTIFY_REPLY, imid, icid),
            )
            .map(|_| ())
        })
    }

    /// Move the preedit spot, through the move extension when negotiated.
    pub fn move_context(&mut self, handle: ContextHandle, x: i16, y: i16) -> Result<()> {
        let ext = self
            .extensions
            .get(ExtensionKind::Move)
            .map(|e| (e.major, e.minor));
        match ext {
            Some((major, minor)) if self.state == SessionState::Ready => {
                self.guarded("move_context", |s| {
                    let (imid, icid) = s.context_ids(handle, "move_context")?;
                    let mut w = WireWriter::new(s.endian);
                    w.put_u16(imid);
                    w.put_u16(icid);
                    w.put_i16(x);
                    w.put_i16(y);
                    s.send(major, minor, w.as_slice())
                })
            }
            _ => {
                let spot = AttrArg::nested(
                    names::PREEDIT_ATTRIBUTES,
                    vec![AttrArg::new(
                        names::SPOT_LOCATION,
                        AttrValue::Point(Point { x, y }),
                    )],
                );
                self.set_ic_values(handle, &[spot])
            }
        }
    }

    /// Session and server ids for `handle`. A context still deferred after
    /// a reconnect is re-created first.
    fn context_ids(&mut self, handle: ContextHandle, op: &'static str) -> Result<(u16, u16)> {
        let imid = self.require_imid(op)?;
        if self.contexts.get(handle)?.icid().is_none() && self.state == SessionState::Ready {
            debug!(context = %handle, op, "re-creating deferred context");
            return Ok((imid, self.recreate_context(handle)?));
        }
        Ok((imid, self.require_icid(handle, op)?))
    }
}

fn id_pair(session: &Session, imid: u16, icid: u16) -> Vec<u8> {
    let mut w = WireWriter::new(session.endian);
    w.put_u16(imid);
    w.put_u16(icid);
    w.freeze().to_vec()
}
