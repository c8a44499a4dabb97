//! Wire decoder (panic-free).
//!
//! Parsing rules:
//! - Never index into the buffer; read through `Buf` after `remaining()` checks.
//! - A bad tag or a payload running past the end stops decoding; everything
//!   read up to that point stays in the target message.

use bytes::Buf;
use tracing::debug;

use crate::error::{Diagnostic, Diagnostics};
use crate::message::{Value, Visitable};
use crate::schema::ScalarType;
use crate::wire::{
    fits_signed, fits_unsigned, get_varint, split_tag, zigzag_decode, VarintError, WireType,
    MAX_FIELD_NUMBER,
};

/// Deepest message nesting the decoder follows.
pub const MAX_NESTING_DEPTH: usize = 64;

/// One field payload as read off the wire, before schema interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Bytes(&'a [u8]),
}

impl WireValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::Fixed64(_) => WireType::Fixed64,
            WireValue::Fixed32(_) => WireType::Fixed32,
            WireValue::Bytes(_) => WireType::LengthDelimited,
        }
    }
}

/// Interpret a wire payload as a value of the declared scalar type.
///
/// Signed integers are zigzag decoded and range checked against the
/// declared width.
pub fn scalar_from_wire(ty: ScalarType, wire: &WireValue<'_>) -> Result<Value, String> {
    let width = ty.bit_width();
    let value = match (ty, *wire) {
        (ScalarType::Bool, WireValue::Varint(v)) => Value::Bool(v != 0),
        (
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64,
            WireValue::Varint(v),
        ) => {
            let n = zigzag_decode(v);
            if !fits_signed(n, width) {
                return Err(format!("{n} out of range for {}", ty.keyword()));
            }
            ty.signed_value(n).ok_or_else(|| format!("{n} out of range for {}", ty.keyword()))?
        }
        (
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 | ScalarType::UInt64,
            WireValue::Varint(v),
        ) => {
            if !fits_unsigned(v, width) {
                return Err(format!("{v} out of range for {}", ty.keyword()));
            }
            ty.unsigned_value(v).ok_or_else(|| format!("{v} out of range for {}", ty.keyword()))?
        }
        (ScalarType::Float, WireValue::Fixed32(v)) => Value::Float(f32::from_bits(v)),
        (ScalarType::Fixed32, WireValue::Fixed32(v)) => Value::UInt32(v),
        (ScalarType::SFixed32, WireValue::Fixed32(v)) => Value::Int32(v as i32),
        (ScalarType::Double, WireValue::Fixed64(v)) => Value::Double(f64::from_bits(v)),
        (ScalarType::Fixed64, WireValue::Fixed64(v)) => Value::UInt64(v),
        (ScalarType::SFixed64, WireValue::Fixed64(v)) => Value::Int64(v as i64),
        (ScalarType::String, WireValue::Bytes(b)) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_string()),
            Err(e) => return Err(format!("string is not valid UTF-8: {e}")),
        },
        (ScalarType::Bytes, WireValue::Bytes(b)) => Value::Bytes(b.to_vec()),
        (ty, wire) => {
            return Err(format!(
                "expected {} for {}, got {}",
                ty.wire_type().as_str(),
                ty.keyword(),
                wire.wire_type().as_str()
            ))
        }
    };
    Ok(value)
}

/// Unpack a packed run of `ty` values. Elements read before a problem are
/// kept; the problem is reported on `cx` against field `number`.
pub fn decode_packed(
    ty: ScalarType,
    data: &[u8],
    number: u32,
    cx: &mut DecodeContext,
) -> Vec<Value> {
    let base = cx.payload_offset();
    let mut cur = data;
    let mut out = Vec::new();
    while cur.has_remaining() {
        let at = base + (data.len() - cur.remaining());
        let wire = match ty.wire_type() {
            WireType::Varint => match get_varint(&mut cur) {
                Ok(v) => WireValue::Varint(v),
                Err(_) => {
                    cx.report(Diagnostic::truncated(
                        at,
                        format!("packed field {number}: bad varint"),
                    ));
                    break;
                }
            },
            WireType::Fixed32 if cur.remaining() >= 4 => WireValue::Fixed32(cur.get_u32_le()),
            WireType::Fixed64 if cur.remaining() >= 8 => WireValue::Fixed64(cur.get_u64_le()),
            _ => {
                cx.report(Diagnostic::truncated(
                    at,
                    format!("packed field {number}: partial element"),
                ));
                break;
            }
        };
        match scalar_from_wire(ty, &wire) {
            Ok(v) => out.push(v),
            Err(msg) => cx.mismatch(number, msg),
        }
    }
    out
}

/// State shared by a decode and all of its nested decodes.
#[derive(Debug, Default)]
pub struct DecodeContext {
    diagnostics: Diagnostics,
    depth: usize,
    payload_offset: usize,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        debug!(
            kind = diagnostic.kind.as_str(),
            position = %diagnostic.position,
            "{}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn mismatch(&mut self, field: u32, message: impl Into<String>) {
        self.report(Diagnostic::mismatch(field, message));
    }

    /// Absolute byte offset of the payload currently being handed out.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Decode `data` (the current length-delimited payload) into `target`.
    /// Returns `false` when the nesting limit stopped the decode.
    pub fn decode_nested(&mut self, data: &[u8], target: &mut dyn Visitable) -> bool {
        let base = self.payload_offset;
        if self.depth >= MAX_NESTING_DEPTH {
            self.report(Diagnostic::malformed_tag(
                base,
                format!("message nesting deeper than {MAX_NESTING_DEPTH}"),
            ));
            return false;
        }
        self.depth += 1;
        drive(data, base, target, self);
        self.depth -= 1;
        true
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

/// Reads a wire buffer and feeds each field to a [`Visitable`].
#[derive(Debug, Clone, Copy)]
pub struct ProtoDecoder<'a> {
    buf: &'a [u8],
}

impl<'a> ProtoDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Decode the whole buffer into `target`, returning what went wrong.
    pub fn decode_into(&self, target: &mut dyn Visitable) -> Diagnostics {
        let mut cx = DecodeContext::new();
        drive(self.buf, 0, target, &mut cx);
        cx.into_diagnostics()
    }
}

fn drive(buf: &[u8], base: usize, target: &mut dyn Visitable, cx: &mut DecodeContext) {
    let mut cur = buf;
    while cur.has_remaining() {
        let tag_at = base + (buf.len() - cur.remaining());
        let tag = match get_varint(&mut cur) {
            Ok(t) => t,
            Err(VarintError::Truncated) => {
                cx.report(Diagnostic::truncated(tag_at, "tag runs past end of input"));
                return;
            }
            Err(VarintError::Overlong) => {
                cx.report(Diagnostic::malformed_tag(tag_at, "tag varint longer than 10 bytes"));
                return;
            }
        };
        let (number, bits) = split_tag(tag);
        let Some(wire_type) = WireType::from_bits(bits) else {
            cx.report(Diagnostic::malformed_tag(tag_at, format!("invalid wire type {bits}")));
            return;
        };
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            cx.report(Diagnostic::malformed_tag(tag_at, format!("invalid field number {number}")));
            return;
        }
        let number = number as u32;

        let value_at = base + (buf.len() - cur.remaining());
        let value = match wire_type {
            WireType::Varint => match get_varint(&mut cur) {
                Ok(v) => WireValue::Varint(v),
                Err(VarintError::Truncated) => {
                    cx.report(Diagnostic::truncated(
                        value_at,
                        format!("field {number}: varint runs past end"),
                    ));
                    return;
                }
                Err(VarintError::Overlong) => {
                    cx.report(Diagnostic::malformed_tag(
                        value_at,
                        format!("field {number}: overlong varint"),
                    ));
                    return;
                }
            },
            WireType::Fixed64 => {
                if cur.remaining() < 8 {
                    cx.report(Diagnostic::truncated(
                        value_at,
                        format!("field {number}: need 8 bytes"),
                    ));
                    return;
                }
                WireValue::Fixed64(cur.get_u64_le())
            }
            WireType::Fixed32 => {
                if cur.remaining() < 4 {
                    cx.report(Diagnostic::truncated(
                        value_at,
                        format!("field {number}: need 4 bytes"),
                    ));
                    return;
                }
                WireValue::Fixed32(cur.get_u32_le())
            }
            WireType::LengthDelimited => {
                let len = match get_varint(&mut cur) {
                    Ok(l) => l,
                    Err(_) => {
                        cx.report(Diagnostic::truncated(
                            value_at,
                            format!("field {number}: bad length prefix"),
                        ));
                        return;
                    }
                };
                if len > cur.remaining() as u64 {
                    cx.report(Diagnostic::truncated(
                        value_at,
                        format!(
                            "field {number}: length {len} exceeds {} remaining bytes",
                            cur.remaining()
                        ),
                    ));
                    return;
                }
                let (data, rest) = cur.split_at(len as usize);
                cur = rest;
                WireValue::Bytes(data)
            }
        };

        cx.payload_offset = base + (buf.len() - cur.remaining()) - value_len(&value);
        if !target.visit_field(number, value, cx) {
            debug!(
                message = target.message_name(),
                field = number,
                wire_type = wire_type.as_str(),
                "skipping unknown field"
            );
        }
    }
}

/// Bytes of payload (without any length prefix) behind `value`.
fn value_len(value: &WireValue<'_>) -> usize {
    match value {
        WireValue::Bytes(b) => b.len(),
        _ => 0,
    }
}
