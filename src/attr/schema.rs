//! Attribute schemas and validity modes.
//!
//! The server sends two ID tables while opening a session, one for
//! IM-level and one for IC-level attributes:
//!
//! ```text
//! id u16 | type u16 | name_len u16 | name | pad(2 + name_len)
//! ```
//!
//! A table is immutable for the life of the session. A few "inner"
//! attributes never cross the wire; they are resolved locally with IDs
//! outside the server's range.
//!
//! Whether an attribute may be used at create/set/get time comes from the
//! compiled-in mode tables below. IC modes depend on the input style, and
//! every context holds its own [`ModeMap`] because once-only bits are
//! consumed per context.

use std::collections::HashMap;

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, XimError};

/// Well-known attribute names.
pub mod names {
    pub const QUERY_INPUT_STYLE: &str = "queryInputStyle";
    pub const RESOURCE_NAME: &str = "resourceName";
    pub const RESOURCE_CLASS: &str = "resourceClass";
    pub const QUERY_IM_VALUES_LIST: &str = "queryIMValuesList";
    pub const QUERY_IC_VALUES_LIST: &str = "queryICValuesList";
    pub const VISIBLE_POSITION: &str = "visiblePosition";

    pub const INPUT_STYLE: &str = "inputStyle";
    pub const CLIENT_WINDOW: &str = "clientWindow";
    pub const FOCUS_WINDOW: &str = "focusWindow";
    pub const FILTER_EVENTS: &str = "filterEvents";
    pub const PREEDIT_ATTRIBUTES: &str = "preeditAttributes";
    pub const STATUS_ATTRIBUTES: &str = "statusAttributes";
    pub const SEPARATOR: &str = "separatorofNestedList";
    pub const STRING_CONVERSION: &str = "stringConversion";
    pub const RESET_STATE: &str = "resetState";
    pub const HOT_KEY: &str = "hotKey";
    pub const HOT_KEY_STATE: &str = "hotKeyState";
    pub const PREEDIT_STATE: &str = "preeditState";

    pub const AREA: &str = "area";
    pub const AREA_NEEDED: &str = "areaNeeded";
    pub const SPOT_LOCATION: &str = "spotLocation";
    pub const COLORMAP: &str = "colorMap";
    pub const STD_COLORMAP: &str = "stdColorMap";
    pub const FOREGROUND: &str = "foreground";
    pub const BACKGROUND: &str = "background";
    pub const BACKGROUND_PIXMAP: &str = "backgroundPixmap";
    pub const FONT_SET: &str = "fontSet";
    pub const LINE_SPACE: &str = "lineSpace";
    pub const CURSOR: &str = "cursor";
}

/// Input style bits.
pub mod style {
    pub const PREEDIT_AREA: u32 = 0x0001;
    pub const PREEDIT_CALLBACKS: u32 = 0x0002;
    pub const PREEDIT_POSITION: u32 = 0x0004;
    pub const PREEDIT_NOTHING: u32 = 0x0008;
    pub const PREEDIT_NONE: u32 = 0x0010;
    pub const STATUS_AREA: u32 = 0x0100;
    pub const STATUS_CALLBACKS: u32 = 0x0200;
    pub const STATUS_NOTHING: u32 = 0x0400;
    pub const STATUS_NONE: u32 = 0x0800;
}

/// Validity mode bits.
pub mod mode {
    pub const IM_DEFAULT: u16 = 0x0001;
    pub const IM_SET: u16 = 0x0002;
    pub const IM_GET: u16 = 0x0004;

    pub const PRE_CREATE: u16 = 0x0010;
    pub const PRE_ONCE: u16 = 0x0020;
    pub const PRE_DEFAULT: u16 = 0x0040;
    pub const PRE_SET: u16 = 0x0080;
    pub const PRE_GET: u16 = 0x0100;

    pub const STS_CREATE: u16 = 0x0200;
    pub const STS_ONCE: u16 = 0x0400;
    pub const STS_DEFAULT: u16 = 0x0800;
    pub const STS_SET: u16 = 0x1000;
    pub const STS_GET: u16 = 0x2000;

    pub const PRE_MASK: u16 = PRE_CREATE | PRE_ONCE | PRE_DEFAULT | PRE_SET | PRE_GET;
    pub const STS_MASK: u16 = STS_CREATE | STS_ONCE | STS_DEFAULT | STS_SET | STS_GET;

    pub const IC_CREATE: u16 = PRE_CREATE | STS_CREATE;
    pub const IC_ONCE: u16 = PRE_ONCE | STS_ONCE;
    pub const IC_DEFAULT: u16 = PRE_DEFAULT | STS_DEFAULT;
    pub const IC_SET: u16 = PRE_SET | STS_SET;
    pub const IC_GET: u16 = PRE_GET | STS_GET;
}

/// Value type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Separator,
    Card8,
    Card16,
    Card32,
    String8,
    Window,
    Styles,
    Rectangle,
    Point,
    FontSet,
    Options,
    HotKeyTriggers,
    HotKeyState,
    StringConversion,
    ValuesList,
    Nested,
}

impl AttrType {
    pub fn from_u16(tag: u16) -> Option<Self> {
        Some(match tag {
            0 => AttrType::Separator,
            1 => AttrType::Card8,
            2 => AttrType::Card16,
            3 => AttrType::Card32,
            4 => AttrType::String8,
            5 => AttrType::Window,
            10 => AttrType::Styles,
            11 => AttrType::Rectangle,
            12 => AttrType::Point,
            13 => AttrType::FontSet,
            14 => AttrType::Options,
            15 => AttrType::HotKeyTriggers,
            16 => AttrType::HotKeyState,
            17 => AttrType::StringConversion,
            18 => AttrType::ValuesList,
            0x7fff => AttrType::Nested,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        match self {
            AttrType::Separator => 0,
            AttrType::Card8 => 1,
            AttrType::Card16 => 2,
            AttrType::Card32 => 3,
            AttrType::String8 => 4,
            AttrType::Window => 5,
            AttrType::Styles => 10,
            AttrType::Rectangle => 11,
            AttrType::Point => 12,
            AttrType::FontSet => 13,
            AttrType::Options => 14,
            AttrType::HotKeyTriggers => 15,
            AttrType::HotKeyState => 16,
            AttrType::StringConversion => 17,
            AttrType::ValuesList => 18,
            AttrType::Nested => 0x7fff,
        }
    }
}

/// Which table an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Im,
    Ic,
}

/// Nesting position while walking an attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nest {
    Top,
    Preedit,
    Status,
}

/// One attribute the schema knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrEntry {
    pub id: u16,
    pub ty: AttrType,
    pub name: String,
}

impl AttrEntry {
    pub fn new(id: u16, ty: AttrType, name: &str) -> Self {
        Self {
            id,
            ty,
            name: name.to_string(),
        }
    }
}

/// How a name was resolved.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// Sent over the wire with the server-assigned id.
    Server(&'a AttrEntry),
    /// Handled locally.
    Inner(&'a AttrEntry),
}

/// Attribute table of one level.
#[derive(Debug, Clone)]
pub struct Schema {
    level: Level,
    entries: Vec<AttrEntry>,
    inner: Vec<AttrEntry>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u16, usize>,
    separator: Option<u16>,
}

const IM_INNER: &[(&str, AttrType)] = &[
    (names::RESOURCE_NAME, AttrType::String8),
    (names::RESOURCE_CLASS, AttrType::String8),
    (names::QUERY_IM_VALUES_LIST, AttrType::ValuesList),
    (names::QUERY_IC_VALUES_LIST, AttrType::ValuesList),
    (names::VISIBLE_POSITION, AttrType::Card32),
];

const IC_INNER: &[(&str, AttrType)] = &[
    (names::RESOURCE_NAME, AttrType::String8),
    (names::RESOURCE_CLASS, AttrType::String8),
];

impl Schema {
    /// Build a schema from server entries, adding the level's inner attributes.
    pub fn new(level: Level, entries: Vec<AttrEntry>) -> Self {
        let (inner_defs, base) = match level {
            Level::Im => (IM_INNER, 100),
            Level::Ic => (IC_INNER, 200),
        };
        let inner = inner_defs
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| AttrEntry::new(base + i as u16, *ty, name))
            .collect();

        let by_name = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let by_id = entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        let separator = entries
            .iter()
            .find(|e| e.name == names::SEPARATOR)
            .map(|e| e.id);

        Self {
            level,
            entries,
            inner,
            by_name,
            by_id,
            separator,
        }
    }

    /// Schema with no server entries.
    pub fn empty(level: Level) -> Self {
        Self::new(level, Vec::new())
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn entries(&self) -> &[AttrEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Server entry by name.
    pub fn get(&self, name: &str) -> Option<&AttrEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Server entry by id.
    pub fn by_id(&self, id: u16) -> Option<&AttrEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    /// Server entry first, then the inner list.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        if let Some(entry) = self.get(name) {
            return Some(Resolved::Server(entry));
        }
        self.inner
            .iter()
            .find(|e| e.name == name)
            .map(Resolved::Inner)
    }

    /// Id that terminates nested groups, when the server defines one.
    pub fn separator_id(&self) -> Option<u16> {
        self.separator
    }

    /// Names of every attribute, server and inner.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .chain(self.inner.iter())
            .filter(|e| e.ty != AttrType::Separator)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Parse `total` bytes of table entries.
    ///
    /// Any entry that overruns the table invalidates the whole table.
    pub fn parse_entries(r: &mut WireReader<'_>, total: usize) -> Result<Vec<AttrEntry>> {
        let mut table = r.sub_reader(total).map_err(|_| invalid_table("table overruns frame"))?;
        let mut entries = Vec::new();
        while table.remaining() >= 6 {
            let id = table.get_u16()?;
            let tag = table.get_u16()?;
            let len = table.get_u16()? as usize;
            if len > table.remaining() {
                return Err(invalid_table("entry name overruns table"));
            }
            let name = table.get_bytes(len)?;
            table.skip_pad(2 + len)?;
            let ty = AttrType::from_u16(tag)
                .ok_or_else(|| invalid_table(&format!("unknown attribute type {}", tag)))?;
            let name = String::from_utf8_lossy(name).into_owned();
            entries.push(AttrEntry { id, ty, name });
        }
        Ok(entries)
    }

    /// Serialize entries in the table format (used by test peers).
    pub fn write_entries(w: &mut WireWriter, entries: &[AttrEntry]) -> Result<()> {
        for e in entries {
            w.put_u16(e.id);
            w.put_u16(e.ty.as_u16());
            w.put_string8_u16(e.name.as_bytes())?;
        }
        Ok(())
    }
}

fn invalid_table(reason: &str) -> XimError {
    XimError::ProtocolViolation(format!("invalid attribute table: {}", reason))
}

/// Result of a mode check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Valid,
    /// Not applicable here; skipped silently.
    Invalid,
    /// Not allowed; the attribute name is reported.
    Error,
}

/// Operation a mode check is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetDefaults,
    Create,
    Set,
    Get,
}

const IM_MODES: &[(&str, u16)] = &[
    (names::QUERY_INPUT_STYLE, mode::IM_DEFAULT | mode::IM_GET),
    (names::RESOURCE_NAME, mode::IM_DEFAULT | mode::IM_SET | mode::IM_GET),
    (names::RESOURCE_CLASS, mode::IM_DEFAULT | mode::IM_SET | mode::IM_GET),
    (names::QUERY_IM_VALUES_LIST, mode::IM_DEFAULT | mode::IM_GET),
    (names::QUERY_IC_VALUES_LIST, mode::IM_DEFAULT | mode::IM_GET),
    (names::VISIBLE_POSITION, mode::IM_DEFAULT | mode::IM_GET),
];

const P_CG: u16 = mode::PRE_CREATE | mode::PRE_GET;
const P_OG: u16 = mode::PRE_ONCE | mode::PRE_GET;
const P_DSG: u16 = mode::PRE_DEFAULT | mode::PRE_SET | mode::PRE_GET;
const P_CSG: u16 = mode::PRE_CREATE | mode::PRE_SET | mode::PRE_GET;
const P_SG: u16 = mode::PRE_SET | mode::PRE_GET;
const P_G: u16 = mode::PRE_GET;
const P_S: u16 = mode::PRE_SET;
const S_CG: u16 = mode::STS_CREATE | mode::STS_GET;
const S_OG: u16 = mode::STS_ONCE | mode::STS_GET;
const S_DSG: u16 = mode::STS_DEFAULT | mode::STS_SET | mode::STS_GET;
const S_CSG: u16 = mode::STS_CREATE | mode::STS_SET | mode::STS_GET;
const S_SG: u16 = mode::STS_SET | mode::STS_GET;
const S_G: u16 = mode::STS_GET;

/// Preedit columns: callbacks, position, area, nothing, none.
/// Status columns: callbacks, area, nothing, none.
#[rustfmt::skip]
const IC_MODES: &[(&str, [u16; 5], [u16; 4])] = &[
    (names::INPUT_STYLE,        [P_CG, P_CG, P_CG, P_CG, P_CG],  [S_CG, S_CG, S_CG, S_CG]),
    (names::CLIENT_WINDOW,      [P_OG, P_OG, P_OG, P_OG, 0],     [S_OG, S_OG, S_OG, 0]),
    (names::FOCUS_WINDOW,       [P_DSG, P_DSG, P_DSG, P_DSG, 0], [S_DSG, S_DSG, S_DSG, 0]),
    (names::RESOURCE_NAME,      [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::RESOURCE_CLASS,     [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::FILTER_EVENTS,      [P_G, P_G, P_G, P_G, 0],         [S_G, S_G, S_G, S_G]),
    (names::STRING_CONVERSION,  [P_S, P_S, P_S, P_S, P_S],       [0, 0, 0, 0]),
    (names::RESET_STATE,        [P_DSG, P_DSG, P_DSG, P_DSG, 0], [0, 0, 0, 0]),
    (names::HOT_KEY,            [P_SG, P_SG, P_SG, P_SG, 0],     [0, 0, 0, 0]),
    (names::HOT_KEY_STATE,      [P_DSG, P_DSG, P_DSG, P_DSG, 0], [0, 0, 0, 0]),
    (names::PREEDIT_ATTRIBUTES, [P_DSG, P_DSG, P_DSG, P_DSG, 0], [0, 0, 0, 0]),
    (names::STATUS_ATTRIBUTES,  [0, 0, 0, 0, 0],                 [S_DSG, S_DSG, S_DSG, 0]),
    (names::AREA,               [0, P_DSG, P_DSG, 0, 0],         [0, S_DSG, 0, 0]),
    (names::AREA_NEEDED,        [0, 0, P_SG, 0, 0],              [0, S_SG, 0, 0]),
    (names::SPOT_LOCATION,      [P_SG, P_CSG, 0, P_SG, P_SG],    [0, 0, 0, 0]),
    (names::COLORMAP,           [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::STD_COLORMAP,       [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::FOREGROUND,         [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::BACKGROUND,         [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::BACKGROUND_PIXMAP,  [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::FONT_SET,           [0, P_CSG, P_CSG, P_DSG, 0],     [0, S_CSG, S_DSG, 0]),
    (names::LINE_SPACE,         [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::CURSOR,             [0, P_DSG, P_DSG, P_DSG, 0],     [0, S_DSG, S_DSG, 0]),
    (names::PREEDIT_STATE,      [P_DSG, P_DSG, P_DSG, P_DSG, 0], [0, 0, 0, 0]),
];

fn preedit_column(input_style: u32) -> usize {
    if input_style & style::PREEDIT_AREA != 0 {
        2
    } else if input_style & style::PREEDIT_CALLBACKS != 0 {
        0
    } else if input_style & style::PREEDIT_POSITION != 0 {
        1
    } else if input_style & style::PREEDIT_NOTHING != 0 {
        3
    } else {
        4
    }
}

fn status_column(input_style: u32) -> usize {
    if input_style & style::STATUS_AREA != 0 {
        1
    } else if input_style & style::STATUS_CALLBACKS != 0 {
        0
    } else if input_style & style::STATUS_NOTHING != 0 {
        2
    } else {
        3
    }
}

/// Mutable validity modes keyed by attribute name.
#[derive(Debug, Clone, Default)]
pub struct ModeMap {
    modes: HashMap<String, u16>,
}

impl ModeMap {
    /// IM-level modes.
    pub fn for_im() -> Self {
        Self {
            modes: IM_MODES
                .iter()
                .map(|(name, m)| (name.to_string(), *m))
                .collect(),
        }
    }

    /// IC-level modes for a context using `input_style`.
    pub fn for_ic(input_style: u32) -> Self {
        let pre = preedit_column(input_style);
        let sts = status_column(input_style);
        Self {
            modes: IC_MODES
                .iter()
                .map(|(name, p, s)| (name.to_string(), p[pre] | s[sts]))
                .collect(),
        }
    }

    pub fn mode(&self, name: &str) -> u16 {
        self.modes.get(name).copied().unwrap_or(0)
    }

    /// IM-level check; never mutates.
    pub fn check_im(&self, name: &str, op: Operation) -> Check {
        let m = self.mode(name);
        if m == 0 {
            return Check::Invalid;
        }
        let bit = match op {
            Operation::SetDefaults => mode::IM_DEFAULT,
            Operation::Set => mode::IM_SET,
            Operation::Get => mode::IM_GET,
            Operation::Create => return Check::Error,
        };
        if m & bit != 0 {
            Check::Valid
        } else {
            Check::Invalid
        }
    }

    /// IC-level check without side effects.
    pub fn check_ic(&self, name: &str, op: Operation, nest: Nest) -> Check {
        self.evaluate(name, op, nest).0
    }

    /// Record that an attribute was used: create/once/default bits are
    /// consumed where the operation uses them up.
    pub fn consume_ic(&mut self, name: &str, op: Operation, nest: Nest) {
        if let (Check::Valid, Some(next)) = self.evaluate(name, op, nest) {
            if let Some(m) = self.modes.get_mut(name) {
                *m = next;
            }
        }
    }

    fn evaluate(&self, name: &str, op: Operation, nest: Nest) -> (Check, Option<u16>) {
        let (mask, create, once, default, set, get) = match nest {
            Nest::Preedit => (
                mode::PRE_MASK,
                mode::PRE_CREATE,
                mode::PRE_ONCE,
                mode::PRE_DEFAULT,
                mode::PRE_SET,
                mode::PRE_GET,
            ),
            Nest::Status => (
                mode::STS_MASK,
                mode::STS_CREATE,
                mode::STS_ONCE,
                mode::STS_DEFAULT,
                mode::STS_SET,
                mode::STS_GET,
            ),
            Nest::Top => (
                u16::MAX,
                mode::IC_CREATE,
                mode::IC_ONCE,
                mode::IC_DEFAULT,
                mode::IC_SET,
                mode::IC_GET,
            ),
        };

        let m = self.mode(name);
        if m & mask == 0 {
            return (Check::Invalid, None);
        }

        match op {
            Operation::SetDefaults => {
                if m & create != 0 {
                    (Check::Error, None)
                } else if m & default == 0 {
                    (Check::Invalid, None)
                } else {
                    (Check::Valid, None)
                }
            }
            Operation::Create => {
                if m & create != 0 {
                    (Check::Valid, Some(m & !create))
                } else if m & once != 0 {
                    (Check::Valid, Some(m & !once))
                } else if m & default != 0 {
                    (Check::Valid, Some(m & !default))
                } else if m & set != 0 {
                    (Check::Valid, None)
                } else {
                    (Check::Error, None)
                }
            }
            Operation::Set => {
                if m & once != 0 {
                    (Check::Valid, Some(m & !once))
                } else if m & set != 0 {
                    (Check::Valid, None)
                } else {
                    (Check::Error, None)
                }
            }
            Operation::Get => {
                if m & get != 0 {
                    (Check::Valid, None)
                } else {
                    (Check::Error, None)
                }
            }
        }
    }

    /// First attribute whose create-time value was never supplied.
    pub fn missing_create(&self) -> Option<&str> {
        let mut missing: Vec<&str> = self
            .modes
            .iter()
            .filter(|(_, m)| **m & mode::IC_CREATE != 0)
            .map(|(name, _)| name.as_str())
            .collect();
        missing.sort_unstable();
        missing.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endian;

    fn sample_entries() -> Vec<AttrEntry> {
        vec![
            AttrEntry::new(0, AttrType::Separator, names::SEPARATOR),
            AttrEntry::new(1, AttrType::Card32, names::INPUT_STYLE),
            AttrEntry::new(2, AttrType::Window, names::CLIENT_WINDOW),
            AttrEntry::new(3, AttrType::Nested, names::PREEDIT_ATTRIBUTES),
        ]
    }

    #[test]
    fn test_parse_write_entries() {
        let mut w = WireWriter::new(Endian::Little);
        Schema::write_entries(&mut w, &sample_entries()).unwrap();
        let total = w.len();
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Little);
        let entries = Schema::parse_entries(&mut r, total).unwrap();
        assert_eq!(entries, sample_entries());
    }

    #[test]
    fn test_malformed_entry_invalidates_table() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_u16(1);
        w.put_u16(3);
        w.put_u16(40);
        w.put_bytes(b"short");
        w.pad_to_4();
        let total = w.len();
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Little);
        assert!(matches!(
            Schema::parse_entries(&mut r, total),
            Err(XimError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_resolve_falls_back_to_inner() {
        let schema = Schema::new(Level::Ic, sample_entries());
        assert!(matches!(
            schema.resolve(names::CLIENT_WINDOW),
            Some(Resolved::Server(e)) if e.id == 2
        ));
        assert!(matches!(
            schema.resolve(names::RESOURCE_NAME),
            Some(Resolved::Inner(e)) if e.id == 200
        ));
        assert!(schema.resolve("bogus").is_none());
        assert_eq!(schema.separator_id(), Some(0));
    }

    #[test]
    fn test_client_window_is_once_only() {
        let style = style::PREEDIT_NOTHING | style::STATUS_NOTHING;
        let mut modes = ModeMap::for_ic(style);
        assert_eq!(
            modes.check_ic(names::CLIENT_WINDOW, Operation::Set, Nest::Top),
            Check::Valid
        );
        modes.consume_ic(names::CLIENT_WINDOW, Operation::Set, Nest::Top);
        assert_eq!(
            modes.check_ic(names::CLIENT_WINDOW, Operation::Set, Nest::Top),
            Check::Error
        );
    }

    #[test]
    fn test_create_requires_input_style() {
        let style = style::PREEDIT_NOTHING | style::STATUS_NOTHING;
        let mut modes = ModeMap::for_ic(style);
        assert_eq!(modes.missing_create(), Some(names::INPUT_STYLE));
        assert_eq!(
            modes.check_ic(names::INPUT_STYLE, Operation::Create, Nest::Top),
            Check::Valid
        );
        modes.consume_ic(names::INPUT_STYLE, Operation::Create, Nest::Top);
        assert_eq!(modes.missing_create(), None);
        assert_eq!(
            modes.check_ic(names::INPUT_STYLE, Operation::Set, Nest::Top),
            Check::Error
        );
    }

    #[test]
    fn test_nested_mode_columns() {
        let area = ModeMap::for_ic(style::PREEDIT_AREA | style::STATUS_AREA);
        assert_eq!(
            area.check_ic(names::AREA, Operation::Set, Nest::Preedit),
            Check::Valid
        );
        let none = ModeMap::for_ic(style::PREEDIT_NONE | style::STATUS_NONE);
        assert_eq!(
            none.check_ic(names::AREA, Operation::Set, Nest::Preedit),
            Check::Invalid
        );
        assert_eq!(
            none.check_ic(names::FILTER_EVENTS, Operation::Get, Nest::Top),
            Check::Valid
        );
    }

    #[test]
    fn test_im_modes() {
        let modes = ModeMap::for_im();
        assert_eq!(
            modes.check_im(names::QUERY_INPUT_STYLE, Operation::Get),
            Check::Valid
        );
        assert_eq!(
            modes.check_im(names::QUERY_INPUT_STYLE, Operation::Set),
            Check::Invalid
        );
        assert_eq!(modes.check_im("unknown", Operation::Get), Check::Invalid);
    }

    #[test]
    fn test_attr_type_tags() {
        for tag in [0u16, 1, 2, 3, 4, 5, 10, 11, 12, 13, 14, 15, 16, 17, 18, 0x7fff] {
            assert_eq!(AttrType::from_u16(tag).unwrap().as_u16(), tag);
        }
        assert!(AttrType::from_u16(6).is_none());
    }
}
