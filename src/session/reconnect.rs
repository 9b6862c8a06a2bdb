//! Reconnect and replay.
//!
//! A reconnectable session that loses its transport keeps its contexts and
//! values. The next operation runs the handshake again, replays the IM
//! values set while disconnected and re-creates every context from its
//! stored values.
//!
//! Replay is per item: a value set or context the new server refuses is
//! logged and skipped, and the others still go through. A context left
//! deferred is re-created the next time an operation uses it. Stored
//! values the new server's schema no longer lists are dropped.

use tracing::{debug, warn};

use super::ops::patch_len;
use super::{ReplyMatch, Session, SessionState};
use crate::attr::{encode_raw, AttrArg, AttrValue, Schema};
use crate::codec::WireWriter;
use crate::error::{Result, XimError};
use crate::handler::{ContextBackend, ContextHandle};
use crate::protocol::opcodes;

impl Session {
    /// Make sure the session can carry `op`, reconnecting if needed.
    pub(crate) fn ensure_ready(&mut self, op: &'static str) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Disconnected if self.config.reconnectable => self.reconnect(),
            state => Err(XimError::InvalidState { state, op }),
        }
    }

    /// Handshake again and replay local state. A transport failure leaves
    /// the session `Disconnected`; anything the server refuses during replay
    /// does not.
    pub(crate) fn reconnect(&mut self) -> Result<()> {
        debug!(contexts = self.contexts.len(), "reconnecting");
        self.reconnecting = true;
        let result = self.establish().and_then(|()| self.replay());
        self.reconnecting = false;

        if let Err(e) = &result {
            if e.is_transport() && self.state == SessionState::Ready {
                self.transport_lost(e);
            }
        }
        result
    }

    fn replay(&mut self) -> Result<()> {
        if !self.im_saved.is_empty() {
            match self.replay_im_values() {
                Ok(()) => self.im_saved.clear(),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!(error = %e, "IM values not replayed"),
            }
        }

        for handle in self.contexts.handles() {
            if self.contexts.get(handle)?.icid().is_some() {
                continue;
            }
            match self.recreate_context(handle) {
                Ok(_) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!(context = %handle, error = %e, "context not re-created"),
            }
        }
        Ok(())
    }

    fn replay_im_values(&mut self) -> Result<()> {
        let imid = self.require_imid("replay")?;
        let args = self.im_values.to_args(&self.quarks, Some(&self.im_saved));
        let args = known_args(&self.im_schema, args);

        let mut w = WireWriter::new(self.endian);
        w.put_u16(imid);
        let len_at = w.reserve_u16();
        encode_raw(&self.im_schema, &args, &mut w)?;
        patch_len(&mut w, len_at, 4)?;
        self.call(
            opcodes::SET_IM_VALUES,
            w.as_slice(),
            ReplyMatch::session(opcodes::SET_IM_VALUES_REPLY, imid),
        )?;
        debug!(values = args.len(), "IM values replayed");
        Ok(())
    }

    /// Create a deferred context on the server from its stored values.
    pub(crate) fn recreate_context(&mut self, handle: ContextHandle) -> Result<u16> {
        let imid = self.require_imid("recreate_context")?;
        let args = self
            .contexts
            .get(handle)?
            .core
            .values
            .to_args(&self.quarks, None);
        let args = known_args(&self.ic_schema, args);

        let mut w = WireWriter::new(self.endian);
        w.put_u16(imid);
        let len_at = w.reserve_u16();
        encode_raw(&self.ic_schema, &args, &mut w)?;
        patch_len(&mut w, len_at, 4)?;

        let frame = self.call(
            opcodes::CREATE_IC,
            w.as_slice(),
            ReplyMatch::session(opcodes::CREATE_IC_REPLY, imid),
        )?;
        let mut r = frame.reader(self.endian);
        r.skip(2)?;
        let icid = r.get_u16()?;

        let context = self.contexts.get_mut(handle)?;
        context.backend = ContextBackend::Remote { icid };
        context.core.saved.clear();
        debug!(context = %handle, icid, "context re-created");
        Ok(icid)
    }
}

/// Keep the stored values `schema` still resolves, group members included.
fn known_args(schema: &Schema, args: Vec<AttrArg>) -> Vec<AttrArg> {
    args.into_iter()
        .filter_map(|arg| {
            if schema.resolve(&arg.name).is_none() {
                warn!(attribute = %arg.name, "stored value unknown to the server, dropped");
                return None;
            }
            Some(match arg.value {
                AttrValue::Nested(inner) => AttrArg::nested(&arg.name, known_args(schema, inner)),
                value => AttrArg {
                    name: arg.name,
                    value,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{names, AttrEntry, AttrType, Level, Point};

    #[test]
    fn test_known_args_drops_unlisted_names() {
        let schema = Schema::new(
            Level::Ic,
            vec![
                AttrEntry::new(0, AttrType::Separator, names::SEPARATOR),
                AttrEntry::new(1, AttrType::Card32, names::INPUT_STYLE),
                AttrEntry::new(4, AttrType::Nested, names::PREEDIT_ATTRIBUTES),
                AttrEntry::new(5, AttrType::Point, names::SPOT_LOCATION),
            ],
        );
        let spot = AttrArg::new(names::SPOT_LOCATION, AttrValue::Point(Point { x: 1, y: 2 }));
        let args = vec![
            AttrArg::new(names::INPUT_STYLE, AttrValue::Card32(0x408)),
            AttrArg::new(names::FOCUS_WINDOW, AttrValue::Window(0x43)),
            AttrArg::nested(
                names::PREEDIT_ATTRIBUTES,
                vec![spot.clone(), AttrArg::new(names::FONT_SET, AttrValue::FontSet("a".into()))],
            ),
            AttrArg::new(names::RESOURCE_NAME, AttrValue::String8(b"xterm".to_vec())),
        ];

        let kept = known_args(&schema, args);
        let kept_names: Vec<&str> = kept.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            kept_names,
            vec![names::INPUT_STYLE, names::PREEDIT_ATTRIBUTES, names::RESOURCE_NAME]
        );
        assert_eq!(kept[1].value, AttrValue::Nested(vec![spot]));
    }
}
