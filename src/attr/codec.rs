//! Attribute list encoding and decoding.
//!
//! Set/create requests carry triples:
//!
//! ```text
//! id u16 | length u16 | value | pad(length)
//! ```
//!
//! A nested group is a triple whose value is itself a block of triples,
//! closed by the schema's separator triple when one exists. Get requests
//! carry a flat `u16` id list where each group is followed by the
//! separator id.
//!
//! Encoding stops at the first name the schema cannot resolve; everything
//! before it stays encoded and applied, and the error names the attribute.
//! When the buffer limit is hit the error carries the index to resume from
//! after the caller grows the limit.

use tracing::trace;

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, XimError};
use crate::protocol::{pad, Endian};

use super::schema::{names, AttrEntry, AttrType, Check, Nest, Resolved, Schema};
use super::value::{decode_value, encode_value, AttrArg, AttrQuery, AttrValue};

/// Owner of the values an attribute list reads or writes.
///
/// Implemented by the session (IM level) and by input contexts (IC level).
pub trait AttrTarget {
    /// Mode check for the operation in progress; must not mutate.
    fn check(&self, entry: &AttrEntry, nest: Nest) -> Check;

    /// Called once an encoded attribute is part of the request: consume
    /// mode bits and apply any local effect of the value.
    fn commit(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()>;

    /// Store an attribute that is never sent to the server.
    fn set_inner(&mut self, entry: &AttrEntry, value: &AttrValue, nest: Nest) -> Result<()>;

    /// Read an attribute that is never sent to the server.
    fn get_inner(&self, entry: &AttrEntry, nest: Nest) -> Result<AttrValue>;

    /// Adjust a value received from the server before it is returned.
    fn received(&mut self, _entry: &AttrEntry, value: AttrValue, _nest: Nest) -> Result<AttrValue> {
        Ok(value)
    }
}

enum Pending<'a> {
    Server(&'a AttrEntry, &'a AttrValue, Nest),
    Inner(&'a AttrEntry, &'a AttrValue, Nest),
}

impl Pending<'_> {
    fn commit(self, target: &mut dyn AttrTarget) -> Result<()> {
        match self {
            Pending::Server(entry, value, nest) => target.commit(entry, value, nest),
            Pending::Inner(entry, value, nest) => target.set_inner(entry, value, nest),
        }
    }
}

fn unresolved(name: &str) -> XimError {
    XimError::AttributeResolution {
        name: name.to_string(),
    }
}

/// Nesting a group attribute opens.
pub fn group_nest(entry: &AttrEntry) -> Nest {
    match entry.name.as_str() {
        names::PREEDIT_ATTRIBUTES => Nest::Preedit,
        names::STATUS_ATTRIBUTES => Nest::Status,
        _ => Nest::Top,
    }
}

/// Encode `args[start..]` into `w`, keeping the payload within `limit` bytes.
pub fn encode_attributes(
    schema: &Schema,
    args: &[AttrArg],
    start: usize,
    limit: usize,
    w: &mut WireWriter,
    target: &mut dyn AttrTarget,
) -> Result<()> {
    for (i, arg) in args.iter().enumerate().skip(start) {
        let mark = w.len();
        let mut pending = Vec::new();
        if let Err(e) = encode_entry(schema, arg, Nest::Top, w, target, &mut pending) {
            w.truncate(mark);
            return Err(e);
        }
        if w.len() > limit {
            w.truncate(mark);
            return Err(XimError::AttributeOverflow { resume_at: i });
        }
        for p in pending {
            p.commit(target)?;
        }
    }
    Ok(())
}

fn encode_entry<'a>(
    schema: &'a Schema,
    arg: &'a AttrArg,
    nest: Nest,
    w: &mut WireWriter,
    target: &dyn AttrTarget,
    pending: &mut Vec<Pending<'a>>,
) -> Result<()> {
    let entry = match schema.resolve(&arg.name) {
        Some(Resolved::Server(entry)) => entry,
        Some(Resolved::Inner(entry)) => {
            pending.push(Pending::Inner(entry, &arg.value, nest));
            return Ok(());
        }
        None => return Err(unresolved(&arg.name)),
    };

    match target.check(entry, nest) {
        Check::Valid => {}
        Check::Invalid => {
            trace!(attribute = %entry.name, "attribute not applicable, skipped");
            return Ok(());
        }
        Check::Error => return Err(unresolved(&entry.name)),
    }

    w.put_u16(entry.id);
    let len_at = w.reserve_u16();
    let body = w.len();
    if entry.ty == AttrType::Nested {
        let inner = arg.value.as_nested().ok_or_else(|| XimError::AttributeValue {
            name: entry.name.clone(),
            expected: AttrType::Nested,
        })?;
        let inner_nest = group_nest(entry);
        for inner_arg in inner {
            encode_entry(schema, inner_arg, inner_nest, w, target, pending)?;
        }
        if let Some(separator) = schema.separator_id() {
            w.put_u16(separator);
            w.put_u16(0);
        }
    } else {
        encode_value(entry, &arg.value, w)?;
    }

    let len = w.len() - body;
    if len > u16::MAX as usize {
        return Err(XimError::PayloadTooLarge(len));
    }
    w.patch_u16(len_at, len as u16);
    w.put_zeros(pad(len));
    pending.push(Pending::Server(entry, &arg.value, nest));
    Ok(())
}

/// Encode the id list of a get request.
pub fn encode_query_ids(
    schema: &Schema,
    queries: &[AttrQuery],
    w: &mut WireWriter,
    target: &dyn AttrTarget,
) -> Result<()> {
    encode_ids(schema, queries, Nest::Top, w, target)
}

fn encode_ids(
    schema: &Schema,
    queries: &[AttrQuery],
    nest: Nest,
    w: &mut WireWriter,
    target: &dyn AttrTarget,
) -> Result<()> {
    for (i, query) in queries.iter().enumerate() {
        let entry = match schema.resolve(query.name()) {
            Some(Resolved::Server(entry)) => entry,
            Some(Resolved::Inner(_)) => continue,
            None => return Err(unresolved(query.name())),
        };
        match target.check(entry, nest) {
            Check::Valid => {}
            Check::Invalid => continue,
            Check::Error => return Err(unresolved(&entry.name)),
        }
        w.put_u16(entry.id);

        if let AttrQuery::Group(_, inner) = query {
            if entry.ty != AttrType::Nested {
                return Err(XimError::AttributeValue {
                    name: entry.name.clone(),
                    expected: entry.ty,
                });
            }
            encode_ids(schema, inner, group_nest(entry), w, target)?;
            match schema.separator_id() {
                Some(separator) => w.put_u16(separator),
                // Without a separator a group can only end the list.
                None => {
                    if let Some(next) = queries.get(i + 1) {
                        return Err(unresolved(next.name()));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Split a triple block into `(id, value)` pairs.
fn split_triples(data: &[u8], endian: Endian) -> Result<Vec<(u16, &[u8])>> {
    let mut r = WireReader::new(data, endian);
    let mut out = Vec::new();
    while r.remaining() >= 4 {
        let id = r.get_u16()?;
        let len = r.get_u16()? as usize;
        let value = r.get_bytes(len)?;
        r.skip_pad(len)?;
        out.push((id, value));
    }
    Ok(out)
}

/// Decode the values of `queries` from a reply's triple block.
///
/// Values come back in query order; a requested attribute missing from
/// the reply is reported by name.
pub fn decode_attributes(
    schema: &Schema,
    queries: &[AttrQuery],
    data: &[u8],
    endian: Endian,
    target: &mut dyn AttrTarget,
) -> Result<Vec<AttrArg>> {
    decode_list(schema, queries, data, endian, Nest::Top, target)
}

fn decode_list(
    schema: &Schema,
    queries: &[AttrQuery],
    data: &[u8],
    endian: Endian,
    nest: Nest,
    target: &mut dyn AttrTarget,
) -> Result<Vec<AttrArg>> {
    let triples = split_triples(data, endian)?;
    let mut out = Vec::with_capacity(queries.len());

    for query in queries {
        let entry = match schema.resolve(query.name()) {
            Some(Resolved::Server(entry)) => entry,
            Some(Resolved::Inner(entry)) => {
                out.push(AttrArg::new(&entry.name, target.get_inner(entry, nest)?));
                continue;
            }
            None => return Err(unresolved(query.name())),
        };
        match target.check(entry, nest) {
            Check::Valid => {}
            Check::Invalid => continue,
            Check::Error => return Err(unresolved(&entry.name)),
        }

        let bytes = triples
            .iter()
            .find(|(id, _)| *id == entry.id)
            .map(|(_, bytes)| *bytes)
            .ok_or_else(|| unresolved(&entry.name))?;

        let value = match (entry.ty, query) {
            (AttrType::Nested, AttrQuery::Group(_, inner)) => AttrValue::Nested(decode_list(
                schema,
                inner,
                bytes,
                endian,
                group_nest(entry),
                target,
            )?),
            (AttrType::Nested, AttrQuery::Value(_)) => {
                AttrValue::Nested(decode_group(schema, bytes, endian, group_nest(entry), target)?)
            }
            _ => {
                let mut r = WireReader::new(bytes, endian);
                decode_value(entry, &mut r)?
            }
        };
        out.push(AttrArg::new(&entry.name, target.received(entry, value, nest)?));
    }
    Ok(out)
}

/// Decode every known triple of a group, skipping the separator.
fn decode_group(
    schema: &Schema,
    data: &[u8],
    endian: Endian,
    nest: Nest,
    target: &mut dyn AttrTarget,
) -> Result<Vec<AttrArg>> {
    let mut out = Vec::new();
    for (id, bytes) in split_triples(data, endian)? {
        let Some(entry) = schema.by_id(id) else {
            continue;
        };
        if matches!(entry.ty, AttrType::Separator | AttrType::Nested) {
            continue;
        }
        let mut r = WireReader::new(bytes, endian);
        let value = decode_value(entry, &mut r)?;
        out.push(AttrArg::new(&entry.name, target.received(entry, value, nest)?));
    }
    Ok(out)
}

/// Encode triples without mode checks or local effects.
///
/// Used to replay stored values and by test peers building replies.
pub fn encode_raw(schema: &Schema, args: &[AttrArg], w: &mut WireWriter) -> Result<()> {
    let mut sink = RawTarget;
    encode_attributes(schema, args, 0, usize::MAX, w, &mut sink)
}

struct RawTarget;

impl AttrTarget for RawTarget {
    fn check(&self, _entry: &AttrEntry, _nest: Nest) -> Check {
        Check::Valid
    }

    fn commit(&mut self, _entry: &AttrEntry, _value: &AttrValue, _nest: Nest) -> Result<()> {
        Ok(())
    }

    fn set_inner(&mut self, _entry: &AttrEntry, _value: &AttrValue, _nest: Nest) -> Result<()> {
        Ok(())
    }

    fn get_inner(&self, entry: &AttrEntry, _nest: Nest) -> Result<AttrValue> {
        Err(unresolved(&entry.name))
    }
}
