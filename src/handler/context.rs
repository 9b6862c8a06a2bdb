//! Input contexts and their registry.
//!
//! Every context shares a [`ContextCore`] of local state. Whether the
//! server currently knows the context is a separate [`ContextBackend`]
//! tag: `Remote` carries the server-assigned id, `Deferred` marks a context
//! that lost its id with the connection and waits to be re-created.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::attr::{
    names, AttrEntry, AttrTarget, AttrType, AttrValue, Check, ModeMap, Nest, Operation, QuarkSet,
    QuarkTable, ValueStore,
};
use crate::encoding::EncodedText;
use crate::error::{Result, XimError};

/// Local handle of an input context; stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(u32);

impl ContextHandle {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ic#{}", self.0)
    }
}

/// Text and/or keysym delivered by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub text: Option<EncodedText>,
    pub keysym: Option<u32>,
}

/// Event masks the server asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMasks {
    /// Events the client must forward to the server.
    pub forward: u32,
    /// Forwarded events that need a sync barrier.
    pub sync: u32,
    /// Extension masks: events filtered, intercepted and selected on the
    /// focus window.
    pub filter: u32,
    pub intercept: u32,
    pub select: u32,
}

/// Local state shared by every kind of context.
#[derive(Debug, Clone)]
pub struct ContextCore {
    pub input_style: u32,
    pub client_window: Option<u32>,
    pub focus_window: Option<u32>,
    pub values: ValueStore,
    pub preedit_font: Option<String>,
    pub status_font: Option<String>,
    pub masks: EventMasks,
    pub modes: ModeMap,
    /// Quarks of values set while disconnected.
    pub saved: QuarkSet,
    commits: VecDeque<CommitRecord>,
}

impl ContextCore {
    pub fn new(input_style: u32) -> Self {
        Self {
            input_style,
            client_window: None,
            focus_window: None,
            values: ValueStore::default(),
            preedit_font: None,
            status_font: None,
            masks: EventMasks::default(),
            modes: ModeMap::for_ic(input_style),
            saved: QuarkSet::default(),
            commits: VecDeque::new(),
        }
    }

    pub fn push_commit(&mut self, record: CommitRecord) {
        self.commits.push_back(record);
    }

    /// Oldest commit not yet looked up.
    pub fn pop_commit(&mut self) -> Option<CommitRecord> {
        self.commits.pop_front()
    }

    pub fn pending_commits(&self) -> usize {
        self.commits.len()
    }
}

/// Whether the server currently knows the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextBackend {
    Remote { icid: u16 },
    Deferred,
}

/// One editing context.
#[derive(Debug, Clone)]
pub struct InputContext {
    pub core: ContextCore,
    pub backend: ContextBackend,
}

impl InputContext {
    pub fn new(core: ContextCore, backend: ContextBackend) -> Self {
        Self { core, backend }
    }

    pub fn icid(&self) -> Option<u16> {
        match self.backend {
            ContextBackend::Remote { icid } => Some(icid),
            ContextBackend::Deferred => None,
        }
    }
}

/// Contexts owned by one session.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: Vec<(ContextHandle, InputContext)>,
    next: u32,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: InputContext) -> ContextHandle {
        self.next += 1;
        let handle = ContextHandle(self.next);
        self.contexts.push((handle, context));
        handle
    }

    pub fn get(&self, handle: ContextHandle) -> Result<&InputContext> {
        self.contexts
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, c)| c)
            .ok_or(XimError::UnknownContext(handle))
    }

    pub fn get_mut(&mut self, handle: ContextHandle) -> Result<&mut InputContext> {
        self.contexts
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, c)| c)
            .ok_or(XimError::UnknownContext(handle))
    }

    pub fn remove(&mut self, handle: ContextHandle) -> Result<InputContext> {
        let pos = self
            .contexts
            .iter()
            .position(|(h, _)| *h == handle)
            .ok_or(XimError::UnknownContext(handle))?;
        Ok(self.contexts.remove(pos).1)
    }

    /// Context the server knows as `icid`.
    pub fn lookup(&self, icid: u16) -> Option<ContextHandle> {
        self.contexts
            .iter()
            .find(|(_, c)| c.icid() == Some(icid))
            .map(|(h, _)| *h)
    }

    pub fn handles(&self) -> Vec<ContextHandle> {
        self.contexts.iter().map(|(h, _)| *h).collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Forget every server id; contexts wait to be re-created.
    pub fn detach_all(&mut self) {
        for (handle, context) in &mut self.contexts {
            if context.backend != ContextBackend::Deferred {
                debug!(context = %handle, "context detached");
                context.backend = ContextBackend::Deferred;
            }
        }
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}

/// Attribute owner for IC-level operations.
pub struct ContextTarget<'a> {
    core: &'a mut ContextCore,
    quarks: &'a mut QuarkTable,
    op: Operation,
    record_saved: bool,
}

impl<'a> ContextTarget<'a> {
    pub fn new(core: &'a mut ContextCore, quarks: &'a mut QuarkTable, op: Operation) -> Self {
        Self {
            core,
            quarks,
            op,
            record_saved: false,
        }
    }

    /// Also remember every committed name in the saved list.
    pub fn recording(mut self) -> Self {
        self.record_saved = true;
        self
    }
}

impl AttrTarget for ContextTarget<'_> {
    fn check(&self, entry: &AttrEntry, nest: Nest) -> Check {
        self.core.modes.check_ic(&entry.name, self.op, nest)
    }

    fn commit(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()> {
        self.core.modes.consume_ic(&entry.name, self.op, nest);

        match (nest, entry.name.as_str()) {
            (Nest::Top, names::CLIENT_WINDOW) => {
                let window = value.as_u32();
                self.core.client_window = window;
                if self.core.focus_window.is_none() {
                    self.core.focus_window = window;
                }
            }
            (Nest::Top, names::FOCUS_WINDOW) => self.core.focus_window = value.as_u32(),
            (Nest::Top, names::INPUT_STYLE) => {
                if let Some(style) = value.as_u32() {
                    self.core.input_style = style;
                }
            }
            (Nest::Preedit, names::FONT_SET) => {
                if let AttrValue::FontSet(base) = value {
                    self.core.preedit_font = Some(base.clone());
                }
            }
            (Nest::Status, names::FONT_SET) => {
                if let AttrValue::FontSet(base) = value {
                    self.core.status_font = Some(base.clone());
                }
            }
            _ => {}
        }

        if entry.ty != AttrType::Nested {
            let quark = self.quarks.intern(&entry.name);
            self.core.values.set(nest, quark, value.clone());
            if self.record_saved {
                self.core.saved.insert(quark);
            }
        }
        Ok(())
    }

    fn set_inner(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()> {
        let quark = self.quarks.intern(&entry.name);
        self.core.values.set(nest, quark, value.clone());
        Ok(())
    }

    fn get_inner(&self, entry: &AttrEntry, nest: Nest) -> Result<AttrValue> {
        self.quarks
            .lookup(&entry.name)
            .and_then(|q| self.core.values.get(nest, q))
            .cloned()
            .ok_or_else(|| XimError::AttributeResolution {
                name: entry.name.clone(),
            })
    }

    fn received(&mut self, entry: &AttrEntry, value: AttrValue, nest: Nest) -> Result<AttrValue> {
        let AttrValue::FontSet(received) = &value else {
            return Ok(value);
        };
        let remembered = match nest {
            Nest::Preedit => &mut self.core.preedit_font,
            Nest::Status => &mut self.core.status_font,
            Nest::Top => return Ok(value),
        };
        let matches = remembered.as_ref().map(|base| base == received);
        match matches {
            Some(true) => Ok(value),
            Some(false) => Err(XimError::AttributeResolution {
                name: entry.name.clone(),
            }),
            None => {
                *remembered = Some(received.clone());
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::style;

    fn nothing_style() -> u32 {
        style::PREEDIT_NOTHING | style::STATUS_NOTHING
    }

    #[test]
    fn test_registry_lookup_by_icid() {
        let mut registry = ContextRegistry::new();
        let a = registry.insert(InputContext::new(
            ContextCore::new(nothing_style()),
            ContextBackend::Remote { icid: 3 },
        ));
        let b = registry.insert(InputContext::new(
            ContextCore::new(nothing_style()),
            ContextBackend::Deferred,
        ));
        assert_ne!(a, b);
        assert_eq!(registry.lookup(3), Some(a));
        assert_eq!(registry.lookup(4), None);

        registry.detach_all();
        assert_eq!(registry.lookup(3), None);
        registry.remove(a).unwrap();
        assert!(matches!(registry.get(a), Err(XimError::UnknownContext(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_commit_fifo_order() {
        let mut core = ContextCore::new(nothing_style());
        core.push_commit(CommitRecord {
            text: None,
            keysym: Some(0x61),
        });
        core.push_commit(CommitRecord {
            text: None,
            keysym: Some(0x62),
        });
        assert_eq!(core.pop_commit().unwrap().keysym, Some(0x61));
        assert_eq!(core.pop_commit().unwrap().keysym, Some(0x62));
        assert!(core.pop_commit().is_none());
    }

    #[test]
    fn test_client_window_sets_focus_default() {
        let mut core = ContextCore::new(nothing_style());
        let mut quarks = QuarkTable::new();
        let entry = AttrEntry::new(2, AttrType::Window, names::CLIENT_WINDOW);
        let mut target = ContextTarget::new(&mut core, &mut quarks, Operation::Set).recording();
        target
            .commit(&entry, &AttrValue::Window(0x42), Nest::Top)
            .unwrap();
        assert_eq!(core.client_window, Some(0x42));
        assert_eq!(core.focus_window, Some(0x42));
        assert_eq!(core.saved.len(), 1);
    }

    #[test]
    fn test_font_set_resolution() {
        let mut core = ContextCore::new(style::PREEDIT_POSITION | style::STATUS_NOTHING);
        let mut quarks = QuarkTable::new();
        let entry = AttrEntry::new(9, AttrType::FontSet, names::FONT_SET);
        let mut target = ContextTarget::new(&mut core, &mut quarks, Operation::Get);

        let first = AttrValue::FontSet("fixed".into());
        assert_eq!(
            target.received(&entry, first.clone(), Nest::Preedit).unwrap(),
            first
        );
        assert!(target
            .received(&entry, first.clone(), Nest::Preedit)
            .is_ok());
        assert!(target
            .received(&entry, AttrValue::FontSet("other".into()), Nest::Preedit)
            .is_err());
    }
}
