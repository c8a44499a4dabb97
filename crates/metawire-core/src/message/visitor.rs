//! Double-dispatch contract between messages and wire formats.
//!
//! Encode direction: a [`Visitable`] walks its fields and calls the typed
//! [`Visitor`] callback for each one. Decode direction: a decoder reads
//! the wire stream and hands each field to [`Visitable::visit_field`],
//! where the message checks it against its own type before storing it.

use crate::codec::{DecodeContext, WireValue};
use crate::schema::FieldKind;

use super::Value;

/// Field metadata passed to every visitor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo<'a> {
    pub number: u32,
    pub name: &'a str,
    /// The value equals the field's default (absent fields always do).
    pub at_default: bool,
}

/// Callback surface a wire format implements. One method per field-type
/// category; integer callbacks carry the declared bit width.
pub trait Visitor {
    fn begin_message(&mut self, _id: i32, _name: &str) {}
    fn end_message(&mut self) {}

    fn visit_bool(&mut self, field: FieldInfo<'_>, value: bool);
    /// `int8`..`int64`, zigzag on the binary wire.
    fn visit_signed(&mut self, field: FieldInfo<'_>, width: u32, value: i64);
    /// `uint8`..`uint64`.
    fn visit_unsigned(&mut self, field: FieldInfo<'_>, width: u32, value: u64);
    fn visit_fixed32(&mut self, field: FieldInfo<'_>, value: u32);
    fn visit_fixed64(&mut self, field: FieldInfo<'_>, value: u64);
    fn visit_sfixed32(&mut self, field: FieldInfo<'_>, value: i32);
    fn visit_sfixed64(&mut self, field: FieldInfo<'_>, value: i64);
    fn visit_float(&mut self, field: FieldInfo<'_>, value: f32);
    fn visit_double(&mut self, field: FieldInfo<'_>, value: f64);
    fn visit_string(&mut self, field: FieldInfo<'_>, value: &str);
    fn visit_bytes(&mut self, field: FieldInfo<'_>, value: &[u8]);
    /// Nested message; the visitor recurses through `value.accept`.
    fn visit_message(&mut self, field: FieldInfo<'_>, value: &dyn Visitable);
    /// Singular nested message that holds nothing. No instance is passed,
    /// so self-referential types stop here.
    fn visit_unset_message(&mut self, field: FieldInfo<'_>, type_name: &str);
    /// Repeated field; `kind` is the element type.
    fn visit_repeated(&mut self, field: FieldInfo<'_>, kind: FieldKind, values: &[Value]);
}

/// Anything that can be walked by a [`Visitor`] and filled by a decoder.
pub trait Visitable {
    /// Wire discriminator of the message type.
    fn message_id(&self) -> i32;

    /// Qualified message type name.
    fn message_name(&self) -> &str;

    /// Report every field, in ascending field-number order.
    fn accept(&self, visitor: &mut dyn Visitor);

    /// Take one decoded field. Returns `false` when `number` is not a field
    /// of this type, so the caller can skip it.
    fn visit_field(&mut self, number: u32, value: WireValue<'_>, cx: &mut DecodeContext) -> bool;
}
