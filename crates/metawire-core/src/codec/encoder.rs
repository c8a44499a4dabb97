//! Wire encoder: a [`Visitor`] that appends each reported field to a buffer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{FieldInfo, Value, Visitable, Visitor};
use crate::schema::{FieldKind, ScalarType};
use crate::wire::{make_tag, put_varint, zigzag_encode, WireType};

/// Encoder knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Put singular fields on the wire even when they hold their default.
    pub emit_defaults: bool,
}

/// Visitor producing the binary wire format.
#[derive(Debug, Default)]
pub struct ProtoEncoder {
    buf: BytesMut,
    options: EncodeOptions,
}

impl ProtoEncoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self {
            buf: BytesMut::new(),
            options,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn skip(&self, field: &FieldInfo<'_>) -> bool {
        field.at_default && !self.options.emit_defaults
    }

    fn tag(&mut self, number: u32, wire_type: WireType) {
        put_varint(&mut self.buf, make_tag(number, wire_type));
    }

    fn delimited(&mut self, number: u32, payload: &[u8]) {
        self.tag(number, WireType::LengthDelimited);
        put_varint(&mut self.buf, payload.len() as u64);
        self.buf.put_slice(payload);
    }

    fn nested(&self, value: &dyn Visitable) -> Bytes {
        let mut child = ProtoEncoder::new(self.options);
        value.accept(&mut child);
        child.finish()
    }
}

/// Append one element of a packed run (no tag).
fn put_packed_element(buf: &mut BytesMut, ty: ScalarType, value: &Value) {
    match (ty.wire_type(), value) {
        (WireType::Varint, Value::Bool(b)) => put_varint(buf, *b as u64),
        (WireType::Varint, v) => {
            if let Some(n) = v.as_i64() {
                put_varint(buf, zigzag_encode(n, ty.bit_width()));
            } else if let Some(n) = v.as_u64() {
                put_varint(buf, n);
            }
        }
        (WireType::Fixed32, Value::Float(x)) => buf.put_f32_le(*x),
        (WireType::Fixed32, Value::UInt32(n)) => buf.put_u32_le(*n),
        (WireType::Fixed32, Value::Int32(n)) => buf.put_i32_le(*n),
        (WireType::Fixed64, Value::Double(x)) => buf.put_f64_le(*x),
        (WireType::Fixed64, Value::UInt64(n)) => buf.put_u64_le(*n),
        (WireType::Fixed64, Value::Int64(n)) => buf.put_i64_le(*n),
        _ => {}
    }
}

impl Visitor for ProtoEncoder {
    fn visit_bool(&mut self, field: FieldInfo<'_>, value: bool) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Varint);
        put_varint(&mut self.buf, value as u64);
    }

    fn visit_signed(&mut self, field: FieldInfo<'_>, width: u32, value: i64) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Varint);
        put_varint(&mut self.buf, zigzag_encode(value, width));
    }

    fn visit_unsigned(&mut self, field: FieldInfo<'_>, _width: u32, value: u64) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Varint);
        put_varint(&mut self.buf, value);
    }

    fn visit_fixed32(&mut self, field: FieldInfo<'_>, value: u32) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed32);
        self.buf.put_u32_le(value);
    }

    fn visit_fixed64(&mut self, field: FieldInfo<'_>, value: u64) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed64);
        self.buf.put_u64_le(value);
    }

    fn visit_sfixed32(&mut self, field: FieldInfo<'_>, value: i32) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed32);
        self.buf.put_i32_le(value);
    }

    fn visit_sfixed64(&mut self, field: FieldInfo<'_>, value: i64) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed64);
        self.buf.put_i64_le(value);
    }

    fn visit_float(&mut self, field: FieldInfo<'_>, value: f32) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed32);
        self.buf.put_f32_le(value);
    }

    fn visit_double(&mut self, field: FieldInfo<'_>, value: f64) {
        if self.skip(&field) {
            return;
        }
        self.tag(field.number, WireType::Fixed64);
        self.buf.put_f64_le(value);
    }

    fn visit_string(&mut self, field: FieldInfo<'_>, value: &str) {
        if self.skip(&field) {
            return;
        }
        self.delimited(field.number, value.as_bytes());
    }

    fn visit_bytes(&mut self, field: FieldInfo<'_>, value: &[u8]) {
        if self.skip(&field) {
            return;
        }
        self.delimited(field.number, value);
    }

    fn visit_message(&mut self, field: FieldInfo<'_>, value: &dyn Visitable) {
        if self.skip(&field) {
            return;
        }
        let payload = self.nested(value);
        self.delimited(field.number, &payload);
    }

    fn visit_unset_message(&mut self, field: FieldInfo<'_>, _type_name: &str) {
        if self.skip(&field) {
            return;
        }
        self.delimited(field.number, &[]);
    }

    fn visit_repeated(&mut self, field: FieldInfo<'_>, kind: FieldKind, values: &[Value]) {
        if values.is_empty() {
            return;
        }
        match kind {
            FieldKind::Scalar(ty) if ty.is_packable() => {
                let mut packed = BytesMut::new();
                for v in values {
                    put_packed_element(&mut packed, ty, v);
                }
                self.delimited(field.number, &packed);
            }
            FieldKind::Scalar(_) => {
                for v in values {
                    match v {
                        Value::String(s) => self.delimited(field.number, s.as_bytes()),
                        Value::Bytes(b) => self.delimited(field.number, b),
                        _ => {}
                    }
                }
            }
            FieldKind::Message => {
                for v in values {
                    if let Value::Message(m) = v {
                        let payload = self.nested(m);
                        self.delimited(field.number, &payload);
                    }
                }
            }
        }
    }
}

/// Encode `message` with default options.
pub fn encode(message: &dyn Visitable) -> Bytes {
    encode_with(message, EncodeOptions::default())
}

pub fn encode_with(message: &dyn Visitable, options: EncodeOptions) -> Bytes {
    let mut encoder = ProtoEncoder::new(options);
    message.accept(&mut encoder);
    encoder.finish()
}
