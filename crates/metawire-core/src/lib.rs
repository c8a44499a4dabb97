//! metawire core: schema-driven messages and their wire formats.
//!
//! A message-definition text is compiled into a [`Schema`] of immutable
//! [`MetaMessage`] types. [`GenericMessage`] instances are filled and read
//! against those types at runtime and exposed through the [`Visitor`] /
//! [`Visitable`] protocol, which the binary codec and the JSON visitor
//! implement. This crate does no I/O.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Parsing and
//! decoding never fail on bad input: they return a best-effort value plus
//! [`Diagnostic`]s.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod json;
pub mod message;
pub mod schema;
pub mod wire;

pub use codec::{encode, encode_with, EncodeOptions, ProtoDecoder, ProtoEncoder};
pub use envelope::{Envelope, TimeStamp};
/// Shared result type.
pub use error::{Decoded, Diagnostic, ErrorKind, MetaWireError, Result};
pub use json::{from_json, to_json, JsonKeys, JsonOptions};
pub use message::{FieldInfo, GenericMessage, Value, Visitable, Visitor};
pub use schema::{parse, MetaField, MetaMessage, Schema};
