//! Binary tag/length/value codec.
//!
//! A message is the concatenation of its field encodings; each field is a
//! varint tag (`number << 3 | wire_type`) followed by a payload whose shape
//! the wire type fixes. See [`crate::wire`] for the primitives.

mod decoder;
mod encoder;

pub use decoder::{
    decode_packed, scalar_from_wire, DecodeContext, ProtoDecoder, WireValue, MAX_NESTING_DEPTH,
};
pub use encoder::{encode, encode_with, EncodeOptions, ProtoEncoder};
