//! Typed attribute values and their wire encodings.

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, XimError};

use super::schema::{AttrEntry, AttrType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

/// One hot key: keysym, modifier, modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotKeyTrigger {
    pub keysym: u32,
    pub modifier: u32,
    pub modifier_mask: u32,
}

/// A value stored in or read from an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Card8(u8),
    Card16(u16),
    Card32(u32),
    String8(Vec<u8>),
    Window(u32),
    Styles(Vec<u32>),
    Rectangle(Rectangle),
    Point(Point),
    /// Base font names, comma separated.
    FontSet(String),
    HotKeyTriggers(Vec<HotKeyTrigger>),
    HotKeyState(u32),
    StringConversion,
    ValuesList(Vec<String>),
    Nested(Vec<AttrArg>),
}

impl AttrValue {
    /// Integer view of scalar values.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::Card8(v) => Some(*v as u32),
            AttrValue::Card16(v) => Some(*v as u32),
            AttrValue::Card32(v) | AttrValue::Window(v) | AttrValue::HotKeyState(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&[AttrArg]> {
        match self {
            AttrValue::Nested(args) => Some(args),
            _ => None,
        }
    }
}

/// A `(name, value)` pair handed to set/create operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrArg {
    pub name: String,
    pub value: AttrValue,
}

impl AttrArg {
    pub fn new(name: &str, value: AttrValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }

    pub fn nested(name: &str, args: Vec<AttrArg>) -> Self {
        Self::new(name, AttrValue::Nested(args))
    }
}

/// A name requested by get operations; groups name their sub-attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrQuery {
    Value(String),
    Group(String, Vec<AttrQuery>),
}

impl AttrQuery {
    pub fn value(name: &str) -> Self {
        AttrQuery::Value(name.to_string())
    }

    pub fn group(name: &str, inner: Vec<AttrQuery>) -> Self {
        AttrQuery::Group(name.to_string(), inner)
    }

    pub fn name(&self) -> &str {
        match self {
            AttrQuery::Value(name) | AttrQuery::Group(name, _) => name,
        }
    }
}

fn mismatch(entry: &AttrEntry) -> XimError {
    XimError::AttributeValue {
        name: entry.name.clone(),
        expected: entry.ty,
    }
}

fn scalar(entry: &AttrEntry, value: &AttrValue) -> Result<u32> {
    value.as_u32().ok_or_else(|| mismatch(entry))
}

/// Write the value bytes (without id, length or padding) for `entry`.
///
/// Nested groups are handled by the attribute codec, not here.
pub fn encode_value(entry: &AttrEntry, value: &AttrValue, w: &mut WireWriter) -> Result<()> {
    match (entry.ty, value) {
        (AttrType::Card8, v) => {
            w.put_u8(u8::try_from(scalar(entry, v)?).map_err(|_| mismatch(entry))?)
        }
        (AttrType::Card16, v) => {
            w.put_u16(u16::try_from(scalar(entry, v)?).map_err(|_| mismatch(entry))?)
        }
        (AttrType::Card32 | AttrType::Window | AttrType::HotKeyState, v) => {
            w.put_u32(scalar(entry, v)?)
        }
        (AttrType::String8, AttrValue::String8(bytes)) => w.put_bytes(bytes),
        (AttrType::Styles, AttrValue::Styles(styles)) => {
            w.put_len_u16(styles.len())?;
            w.put_u16(0);
            for s in styles {
                w.put_u32(*s);
            }
        }
        (AttrType::Rectangle, AttrValue::Rectangle(r)) => {
            w.put_i16(r.x);
            w.put_i16(r.y);
            w.put_u16(r.width);
            w.put_u16(r.height);
        }
        (AttrType::Point, AttrValue::Point(p)) => {
            w.put_i16(p.x);
            w.put_i16(p.y);
        }
        (AttrType::FontSet, AttrValue::FontSet(names)) => {
            w.put_len_u16(names.len())?;
            w.put_bytes(names.as_bytes());
        }
        (AttrType::HotKeyTriggers, AttrValue::HotKeyTriggers(triggers)) => {
            w.put_u32(u32::try_from(triggers.len()).map_err(|_| mismatch(entry))?);
            for t in triggers {
                w.put_u32(t.keysym);
                w.put_u32(t.modifier);
                w.put_u32(t.modifier_mask);
            }
        }
        (AttrType::StringConversion | AttrType::Separator, _) => {}
        _ => return Err(mismatch(entry)),
    }
    Ok(())
}

/// Decode the value bytes of `entry`.
pub fn decode_value(entry: &AttrEntry, r: &mut WireReader<'_>) -> Result<AttrValue> {
    Ok(match entry.ty {
        AttrType::Card8 => AttrValue::Card8(r.get_u8()?),
        AttrType::Card16 => AttrValue::Card16(r.get_u16()?),
        AttrType::Card32 => AttrValue::Card32(r.get_u32()?),
        AttrType::Window => AttrValue::Window(r.get_u32()?),
        AttrType::HotKeyState => AttrValue::HotKeyState(r.get_u32()?),
        AttrType::String8 => AttrValue::String8(r.rest().to_vec()),
        AttrType::Styles => {
            let count = r.get_u16()? as usize;
            r.skip(2)?;
            let mut styles = Vec::with_capacity(count);
            for _ in 0..count {
                styles.push(r.get_u32()?);
            }
            AttrValue::Styles(styles)
        }
        AttrType::Rectangle => AttrValue::Rectangle(Rectangle {
            x: r.get_i16()?,
            y: r.get_i16()?,
            width: r.get_u16()?,
            height: r.get_u16()?,
        }),
        AttrType::Point => AttrValue::Point(Point {
            x: r.get_i16()?,
            y: r.get_i16()?,
        }),
        AttrType::FontSet => {
            let len = r.get_u16()? as usize;
            let names = r.get_bytes(len)?;
            AttrValue::FontSet(String::from_utf8_lossy(names).into_owned())
        }
        AttrType::HotKeyTriggers => {
            let count = r.get_u32()? as usize;
            let mut triggers = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                triggers.push(HotKeyTrigger {
                    keysym: r.get_u32()?,
                    modifier: r.get_u32()?,
                    modifier_mask: r.get_u32()?,
                });
            }
            AttrValue::HotKeyTriggers(triggers)
        }
        AttrType::StringConversion => AttrValue::StringConversion,
        AttrType::Separator | AttrType::Options | AttrType::ValuesList | AttrType::Nested => {
            return Err(mismatch(entry))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endian;

    fn roundtrip(ty: AttrType, value: AttrValue) -> AttrValue {
        let entry = AttrEntry::new(9, ty, "value");
        let mut w = WireWriter::new(Endian::Big);
        encode_value(&entry, &value, &mut w).unwrap();
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Big);
        decode_value(&entry, &mut r).unwrap()
    }

    #[test]
    fn test_structured_values() {
        let styles = AttrValue::Styles(vec![0x408, 0x404]);
        assert_eq!(roundtrip(AttrType::Styles, styles.clone()), styles);

        let rect = AttrValue::Rectangle(Rectangle {
            x: -3,
            y: 4,
            width: 100,
            height: 20,
        });
        assert_eq!(roundtrip(AttrType::Rectangle, rect.clone()), rect);

        let keys = AttrValue::HotKeyTriggers(vec![HotKeyTrigger {
            keysym: 0x20,
            modifier: 4,
            modifier_mask: 4,
        }]);
        assert_eq!(roundtrip(AttrType::HotKeyTriggers, keys.clone()), keys);
    }

    #[test]
    fn test_every_value_type_roundtrips() {
        let cases = vec![
            (AttrType::Card8, AttrValue::Card8(0xfe)),
            (AttrType::Card16, AttrValue::Card16(0xbeef)),
            (AttrType::Card32, AttrValue::Card32(0xdead_beef)),
            (AttrType::Window, AttrValue::Window(0x0040_0001)),
            (AttrType::HotKeyState, AttrValue::HotKeyState(2)),
            (AttrType::String8, AttrValue::String8(b"xterm".to_vec())),
            (AttrType::String8, AttrValue::String8(Vec::new())),
            (AttrType::Styles, AttrValue::Styles(Vec::new())),
            (AttrType::Point, AttrValue::Point(Point { x: -5, y: 700 })),
            (
                AttrType::FontSet,
                AttrValue::FontSet("-misc-fixed-*,-adobe-helvetica-*".to_string()),
            ),
            (AttrType::HotKeyTriggers, AttrValue::HotKeyTriggers(Vec::new())),
            (AttrType::StringConversion, AttrValue::StringConversion),
        ];
        for (ty, value) in cases {
            assert_eq!(roundtrip(ty, value.clone()), value, "{:?}", ty);
        }
    }

    #[test]
    fn test_out_of_range_scalar_is_rejected() {
        let entry = AttrEntry::new(2, AttrType::Card8, "lineSpace");
        let mut w = WireWriter::new(Endian::Little);
        let err = encode_value(&entry, &AttrValue::Card32(300), &mut w).unwrap_err();
        assert!(matches!(err, XimError::AttributeValue { expected: AttrType::Card8, .. }));

        let entry = AttrEntry::new(2, AttrType::Card16, "lineSpace");
        assert!(encode_value(&entry, &AttrValue::Card32(0x1_0000), &mut w).is_err());
        assert!(w.is_empty());
    }

    #[test]
    fn test_oversize_font_set_is_rejected() {
        let entry = AttrEntry::new(7, AttrType::FontSet, "fontSet");
        let mut w = WireWriter::new(Endian::Little);
        let names = "f".repeat(70_000);
        assert!(matches!(
            encode_value(&entry, &AttrValue::FontSet(names), &mut w),
            Err(XimError::PayloadTooLarge(70_000))
        ));
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(
            roundtrip(AttrType::Window, AttrValue::Card32(0x1234)),
            AttrValue::Window(0x1234)
        );
    }

    #[test]
    fn test_styles_layout() {
        let entry = AttrEntry::new(1, AttrType::Styles, "queryInputStyle");
        let mut w = WireWriter::new(Endian::Little);
        encode_value(&entry, &AttrValue::Styles(vec![0x408]), &mut w).unwrap();
        assert_eq!(w.as_slice(), &[1, 0, 0, 0, 0x08, 0x04, 0, 0]);
    }

    #[test]
    fn test_type_mismatch_names_attribute() {
        let entry = AttrEntry::new(3, AttrType::Point, "spotLocation");
        let mut w = WireWriter::new(Endian::Little);
        let err = encode_value(&entry, &AttrValue::String8(b"x".to_vec()), &mut w).unwrap_err();
        assert!(matches!(
            err,
            XimError::AttributeValue { ref name, expected: AttrType::Point } if name == "spotLocation"
        ));
    }

    #[test]
    fn test_truncated_value() {
        let entry = AttrEntry::new(3, AttrType::Rectangle, "area");
        let mut r = WireReader::new(&[0, 0, 0, 0], Endian::Little);
        assert!(matches!(decode_value(&entry, &mut r), Err(XimError::Truncated)));
    }
}
