//! Interned attribute names and stored values.
//!
//! Values set on a context are kept keyed by [`Quark`] so they can be
//! replayed after a reconnect, and so sets made while disconnected can be
//! remembered as a deduplicated list.

use std::collections::HashMap;

use super::schema::{names, Nest};
use super::value::{AttrArg, AttrValue};

/// Small integer standing for an attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quark(u32);

impl Quark {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Name interning table.
#[derive(Debug, Clone, Default)]
pub struct QuarkTable {
    by_name: HashMap<String, Quark>,
    names: Vec<String>,
}

impl QuarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Quark {
        if let Some(q) = self.by_name.get(name) {
            return *q;
        }
        let q = Quark(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), q);
        q
    }

    pub fn lookup(&self, name: &str) -> Option<Quark> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, quark: Quark) -> Option<&str> {
        self.names.get(quark.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Ordered set of quarks; inserting a duplicate is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuarkSet {
    items: Vec<Quark>,
}

impl QuarkSet {
    pub fn insert(&mut self, quark: Quark) -> bool {
        if self.items.contains(&quark) {
            return false;
        }
        self.items.push(quark);
        true
    }

    pub fn contains(&self, quark: Quark) -> bool {
        self.items.contains(&quark)
    }

    pub fn iter(&self) -> impl Iterator<Item = Quark> + '_ {
        self.items.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Attribute values keyed by nesting position and quark, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    entries: Vec<(Nest, Quark, AttrValue)>,
}

impl ValueStore {
    pub fn set(&mut self, nest: Nest, quark: Quark, value: AttrValue) {
        match self
            .entries
            .iter_mut()
            .find(|(n, q, _)| *n == nest && *q == quark)
        {
            Some(slot) => slot.2 = value,
            None => self.entries.push((nest, quark, value)),
        }
    }

    pub fn get(&self, nest: Nest, quark: Quark) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find(|(n, q, _)| *n == nest && *q == quark)
            .map(|(_, _, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild an argument list, regrouping preedit and status values.
    ///
    /// With `only`, top-level values are limited to those quarks; group
    /// members are included when their group name or member is listed.
    pub fn to_args(&self, quarks: &QuarkTable, only: Option<&QuarkSet>) -> Vec<AttrArg> {
        let wanted = |q: Quark| only.map_or(true, |set| set.contains(q));
        let mut top = Vec::new();
        let mut preedit = Vec::new();
        let mut status = Vec::new();

        for (nest, quark, value) in &self.entries {
            let Some(name) = quarks.name(*quark) else {
                continue;
            };
            let arg = AttrArg::new(name, value.clone());
            match nest {
                Nest::Top if wanted(*quark) => top.push(arg),
                Nest::Top => {}
                Nest::Preedit => preedit.push((*quark, arg)),
                Nest::Status => status.push((*quark, arg)),
            }
        }

        for (group, members) in [
            (names::PREEDIT_ATTRIBUTES, preedit),
            (names::STATUS_ATTRIBUTES, status),
        ] {
            let group_wanted = quarks.lookup(group).map_or(false, wanted);
            let members: Vec<AttrArg> = members
                .into_iter()
                .filter(|(q, _)| group_wanted || wanted(*q))
                .map(|(_, arg)| arg)
                .collect();
            if !members.is_empty() {
                top.push(AttrArg::nested(group, members));
            }
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut table = QuarkTable::new();
        let a = table.intern("focusWindow");
        let b = table.intern("clientWindow");
        assert_ne!(a, b);
        assert_eq!(table.intern("focusWindow"), a);
        assert_eq!(table.name(b), Some("clientWindow"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_quark_set_dedups() {
        let mut table = QuarkTable::new();
        let mut set = QuarkSet::default();
        let q = table.intern("focusWindow");
        assert!(set.insert(q));
        assert!(!set.insert(q));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_store_regroups_nested_values() {
        let mut table = QuarkTable::new();
        let mut store = ValueStore::default();
        let focus = table.intern(names::FOCUS_WINDOW);
        let spot = table.intern(names::SPOT_LOCATION);
        table.intern(names::PREEDIT_ATTRIBUTES);

        store.set(Nest::Top, focus, AttrValue::Window(1));
        store.set(Nest::Top, focus, AttrValue::Window(2));
        store.set(Nest::Preedit, spot, AttrValue::Card32(0));

        let args = store.to_args(&table, None);
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], AttrArg::new(names::FOCUS_WINDOW, AttrValue::Window(2)));
        assert_eq!(args[1].name, names::PREEDIT_ATTRIBUTES);

        let mut only = QuarkSet::default();
        only.insert(focus);
        assert_eq!(store.to_args(&table, Some(&only)).len(), 1);
    }
}
