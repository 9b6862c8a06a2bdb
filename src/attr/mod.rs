//! Attribute system: schemas, typed values, list codecs.
//!
//! Names are resolved against the server's schema first and the local
//! inner list second. Validity modes decide whether a name may be used by
//! a given operation, and [`AttrTarget`] owners apply the local effects.

mod codec;
mod quark;
mod schema;
mod value;

pub use codec::{
    decode_attributes, encode_attributes, encode_query_ids, encode_raw, group_nest, AttrTarget,
};
pub use quark::{Quark, QuarkSet, QuarkTable, ValueStore};
pub use schema::{
    mode, names, style, AttrEntry, AttrType, Check, Level, ModeMap, Nest, Operation, Resolved,
    Schema,
};
pub use value::{
    decode_value, encode_value, AttrArg, AttrQuery, AttrValue, HotKeyTrigger, Point, Rectangle,
};
