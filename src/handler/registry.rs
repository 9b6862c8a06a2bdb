//! Dispatch table for server-initiated frames.
//!
//! Handlers are keyed by `(major, minor)`; a `None` minor matches any minor
//! opcode. Candidates are tried in registration order and the first one
//! that claims the frame wins.
//!
//! # Example
//!
//! ```
//! use xim_client::handler::DispatchTable;
//! use xim_client::protocol::{opcodes, Frame};
//!
//! struct Counter(u32);
//!
//! let mut table: DispatchTable<Counter> = DispatchTable::new();
//! table.register(opcodes::SYNC, None, "sync", |c: &mut Counter, _frame: &Frame| {
//!     c.0 += 1;
//!     Ok(true)
//! });
//!
//! let frame = Frame::from_payload(opcodes::SYNC, 0, &[0; 4]).unwrap();
//! let mut counter = Counter(0);
//! for (_name, handler) in table.candidates(&frame) {
//!     if handler(&mut counter, &frame).unwrap() {
//!         break;
//!     }
//! }
//! assert_eq!(counter.0, 1);
//! ```

use std::rc::Rc;

use crate::error::Result;
use crate::protocol::Frame;

/// A handler returns `Ok(true)` when it consumed the frame.
pub type Handler<S> = Rc<dyn Fn(&mut S, &Frame) -> Result<bool>>;

struct HandlerEntry<S> {
    major: u8,
    minor: Option<u8>,
    name: &'static str,
    handler: Handler<S>,
}

/// Ordered `(opcode, handler)` registrations.
pub struct DispatchTable<S> {
    entries: Vec<HandlerEntry<S>>,
}

impl<S> DispatchTable<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a handler; earlier registrations take precedence.
    pub fn register<F>(&mut self, major: u8, minor: Option<u8>, name: &'static str, handler: F)
    where
        F: Fn(&mut S, &Frame) -> Result<bool> + 'static,
    {
        self.entries.push(HandlerEntry {
            major,
            minor,
            name,
            handler: Rc::new(handler),
        });
    }

    /// Remove every handler registered under `name`.
    pub fn unregister(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// Handlers matching `frame`, in registration order.
    ///
    /// The handlers are cloned out so they can run while the owner of the
    /// table is mutably borrowed, including registering more handlers.
    pub fn candidates(&self, frame: &Frame) -> Vec<(&'static str, Handler<S>)> {
        self.entries
            .iter()
            .filter(|e| e.major == frame.major() && e.minor.map_or(true, |m| m == frame.minor()))
            .map(|e| (e.name, Rc::clone(&e.handler)))
            .collect()
    }
}

impl<S> Default for DispatchTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::opcodes;

    #[derive(Default)]
    struct Log(Vec<&'static str>);

    fn frame(major: u8, minor: u8) -> Frame {
        Frame::from_payload(major, minor, &[]).unwrap()
    }

    fn run(table: &DispatchTable<Log>, log: &mut Log, frame: &Frame) -> bool {
        for (_, handler) in table.candidates(frame) {
            if handler(log, frame).unwrap() {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_first_claimer_wins() {
        let mut table = DispatchTable::new();
        table.register(opcodes::COMMIT, None, "decline", |log: &mut Log, _| {
            log.0.push("decline");
            Ok(false)
        });
        table.register(opcodes::COMMIT, None, "claim", |log: &mut Log, _| {
            log.0.push("claim");
            Ok(true)
        });
        table.register(opcodes::COMMIT, None, "never", |log: &mut Log, _| {
            log.0.push("never");
            Ok(true)
        });

        let mut log = Log::default();
        assert!(run(&table, &mut log, &frame(opcodes::COMMIT, 0)));
        assert_eq!(log.0, vec!["decline", "claim"]);
    }

    #[test]
    fn test_minor_filter() {
        let mut table = DispatchTable::new();
        table.register(opcodes::EXTENSION, Some(0x30), "mask", |_: &mut Log, _| Ok(true));

        assert_eq!(table.candidates(&frame(opcodes::EXTENSION, 0x30)).len(), 1);
        assert!(table.candidates(&frame(opcodes::EXTENSION, 0x31)).is_empty());
        assert!(table.candidates(&frame(opcodes::SYNC, 0x30)).is_empty());
    }

    #[test]
    fn test_unregister_and_unclaimed() {
        let mut table = DispatchTable::new();
        table.register(opcodes::SYNC, None, "sync", |_: &mut Log, _| Ok(true));
        table.unregister("sync");
        assert!(table.is_empty());

        let mut log = Log::default();
        assert!(!run(&table, &mut log, &frame(opcodes::SYNC, 0)));
    }
}
