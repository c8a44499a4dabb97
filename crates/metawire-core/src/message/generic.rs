//! Schema-backed, dynamically typed message instances.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::visitor::{FieldInfo, Visitable, Visitor};
use super::Value;
use crate::codec::{decode_packed, scalar_from_wire, DecodeContext, ProtoDecoder, WireValue};
use crate::error::{Decoded, Diagnostics, MetaWireError, Result};
use crate::schema::{FieldKind, FieldType, MetaField, MetaMessage, ScalarType, Schema};

/// Runtime message built against a [`MetaMessage`].
///
/// Field values are kept in a map keyed by field number; the type model is
/// consulted on every mutation, so a stored value always matches its
/// field's declared type. Unset fields read back as their default.
#[derive(Clone)]
pub struct GenericMessage {
    schema: Arc<Schema>,
    meta: Arc<MetaMessage>,
    values: BTreeMap<u32, Value>,
    rejected: u32,
}

impl GenericMessage {
    /// Empty instance of the named message type.
    pub fn new(schema: &Arc<Schema>, name: &str) -> Option<Self> {
        let meta = schema.get_arc(name)?.clone();
        Some(Self::with_meta(schema, meta))
    }

    /// Empty instance of the message type with the given id.
    pub fn new_by_id(schema: &Arc<Schema>, id: i32) -> Option<Self> {
        let meta = schema.get_arc_by_id(id)?.clone();
        Some(Self::with_meta(schema, meta))
    }

    fn with_meta(schema: &Arc<Schema>, meta: Arc<MetaMessage>) -> Self {
        Self {
            schema: Arc::clone(schema),
            meta,
            values: BTreeMap::new(),
            rejected: 0,
        }
    }

    /// Decode `bytes` as the named message type.
    pub fn decode(schema: &Arc<Schema>, name: &str, bytes: &[u8]) -> Result<Decoded<Self>> {
        let mut msg = Self::new(schema, name)
            .ok_or_else(|| MetaWireError::UnknownMessage(name.to_string()))?;
        let diagnostics = msg.visit(&ProtoDecoder::new(bytes));
        Ok(Decoded::new(msg, diagnostics))
    }

    /// Decode `bytes` as the message type with the given id.
    pub fn decode_by_id(schema: &Arc<Schema>, id: i32, bytes: &[u8]) -> Result<Decoded<Self>> {
        let mut msg = Self::new_by_id(schema, id)
            .ok_or_else(|| MetaWireError::UnknownMessage(format!("id {id}")))?;
        let diagnostics = msg.visit(&ProtoDecoder::new(bytes));
        Ok(Decoded::new(msg, diagnostics))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn meta(&self) -> &MetaMessage {
        &self.meta
    }

    /// Number of `set_*` calls refused since creation.
    pub fn rejected_count(&self) -> u32 {
        self.rejected
    }

    fn reject(&mut self, number: u32, why: &str) -> bool {
        self.rejected += 1;
        trace!(message = self.meta.name(), field = number, why, "set rejected");
        false
    }

    /// Store `value` in field `number`. Unknown numbers and type mismatches
    /// are refused (returns `false`) and counted.
    pub fn set_value(&mut self, number: u32, value: impl Into<Value>) -> bool {
        let value = value.into();
        let Some(field) = self.meta.field(number) else {
            return self.reject(number, "unknown field");
        };
        if !field.accepts(&value) {
            return self.reject(number, "type mismatch");
        }
        self.values.insert(number, value);
        true
    }

    /// [`set_value`](Self::set_value) addressed by field name.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.meta.field_by_name(name).map(MetaField::number) {
            Some(n) => self.set_value(n, value),
            None => self.reject(0, "unknown field name"),
        }
    }

    /// Append one element to a repeated field.
    pub fn push(&mut self, number: u32, element: impl Into<Value>) -> bool {
        let element = element.into();
        let ok = self
            .meta
            .field(number)
            .is_some_and(|f| f.is_repeated() && f.accepts_element(&element));
        if !ok {
            return self.reject(number, "not a repeated field of this element type");
        }
        self.push_unchecked(number, element);
        true
    }

    fn push_unchecked(&mut self, number: u32, element: Value) {
        match self.values.entry(number).or_insert_with(|| Value::List(Vec::new())) {
            Value::List(items) => items.push(element),
            other => *other = Value::List(vec![element]),
        }
    }

    /// Current value of field `number`, or its default when unset.
    /// `None` only for numbers the type does not declare.
    pub fn value(&self, number: u32) -> Option<Cow<'_, Value>> {
        if let Some(v) = self.values.get(&number) {
            return Some(Cow::Borrowed(v));
        }
        let field = self.meta.field(number)?;
        match field.default_value() {
            Some(d) => Some(Cow::Borrowed(d)),
            None => self.empty_nested(field).map(|m| Cow::Owned(Value::Message(m))),
        }
    }

    pub fn value_by_name(&self, name: &str) -> Option<Cow<'_, Value>> {
        let number = self.meta.field_by_name(name)?.number();
        self.value(number)
    }

    /// Mutable access to a singular nested message, created empty on first use.
    pub fn message_mut(&mut self, number: u32) -> Option<&mut GenericMessage> {
        let field = self.meta.field(number)?;
        if field.is_repeated() || field.kind() != FieldKind::Message {
            return None;
        }
        if !self.values.contains_key(&number) {
            let nested = self.empty_nested(field)?;
            self.values.insert(number, Value::Message(nested));
        }
        match self.values.get_mut(&number) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        }
    }

    /// Empty instance of the nested type declared by `field`.
    pub fn empty_nested(&self, field: &MetaField) -> Option<GenericMessage> {
        match field.field_type() {
            FieldType::Message(name) => GenericMessage::new(&self.schema, name),
            FieldType::Scalar(_) => None,
        }
    }

    /// Was field `number` explicitly stored?
    pub fn is_set(&self, number: u32) -> bool {
        self.values.contains_key(&number)
    }

    /// Forget field `number`, returning what was stored.
    pub fn clear(&mut self, number: u32) -> Option<Value> {
        self.values.remove(&number)
    }

    /// Explicitly stored fields, ascending by number.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> + '_ {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    /// Every field reads back as its default.
    pub fn is_default(&self) -> bool {
        self.meta
            .fields()
            .iter()
            .all(|f| self.field_at_default(f))
    }

    fn field_at_default(&self, field: &MetaField) -> bool {
        match (self.values.get(&field.number()), field.default_value()) {
            (None, _) => true,
            (Some(Value::Message(m)), None) => m.is_default(),
            (Some(v), Some(d)) => v == d,
            (Some(_), None) => false,
        }
    }

    /// Run `decoder` over this message (inverted control: the decoder calls
    /// back into [`Visitable::visit_field`]).
    pub fn visit(&mut self, decoder: &ProtoDecoder<'_>) -> Diagnostics {
        decoder.decode_into(self)
    }

    fn decode_nested(
        &self,
        field: &MetaField,
        data: &[u8],
        cx: &mut DecodeContext,
    ) -> Option<GenericMessage> {
        let mut nested = self.empty_nested(field)?;
        cx.decode_nested(data, &mut nested);
        Some(nested)
    }
}

/// Invoke the callback matching a scalar's declared type.
pub fn visit_scalar(visitor: &mut dyn Visitor, info: FieldInfo<'_>, ty: ScalarType, value: &Value) {
    match (ty, value) {
        (ScalarType::Bool, Value::Bool(b)) => visitor.visit_bool(info, *b),
        (ScalarType::Fixed32, Value::UInt32(n)) => visitor.visit_fixed32(info, *n),
        (ScalarType::Fixed64, Value::UInt64(n)) => visitor.visit_fixed64(info, *n),
        (ScalarType::SFixed32, Value::Int32(n)) => visitor.visit_sfixed32(info, *n),
        (ScalarType::SFixed64, Value::Int64(n)) => visitor.visit_sfixed64(info, *n),
        (ScalarType::Float, Value::Float(x)) => visitor.visit_float(info, *x),
        (ScalarType::Double, Value::Double(x)) => visitor.visit_double(info, *x),
        (ScalarType::String, Value::String(s)) => visitor.visit_string(info, s),
        (ScalarType::Bytes, Value::Bytes(b)) => visitor.visit_bytes(info, b),
        (ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64, v) => {
            if let Some(n) = v.as_i64() {
                visitor.visit_signed(info, ty.bit_width(), n);
            }
        }
        (ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 | ScalarType::UInt64, v) => {
            if let Some(n) = v.as_u64() {
                visitor.visit_unsigned(info, ty.bit_width(), n);
            }
        }
        _ => {}
    }
}

impl Visitable for GenericMessage {
    fn message_id(&self) -> i32 {
        self.meta.id()
    }

    fn message_name(&self) -> &str {
        self.meta.name()
    }

    fn accept(&self, visitor: &mut dyn Visitor) {
        visitor.begin_message(self.meta.id(), self.meta.name());
        for field in self.meta.fields_by_number() {
            let info = FieldInfo {
                number: field.number(),
                name: field.name(),
                at_default: self.field_at_default(field),
            };
            let unset = !self.is_set(field.number());
            if field.kind() == FieldKind::Message && !field.is_repeated() && unset {
                visitor.visit_unset_message(info, field.field_type().type_name());
                continue;
            }
            let Some(value) = self.value(field.number()) else { continue };
            match (field.kind(), value.as_ref()) {
                (kind, Value::List(items)) if field.is_repeated() => {
                    visitor.visit_repeated(info, kind, items)
                }
                (FieldKind::Message, Value::Message(m)) => visitor.visit_message(info, m),
                (FieldKind::Scalar(s), v) => visit_scalar(visitor, info, s, v),
                _ => {}
            }
        }
        visitor.end_message();
    }

    fn visit_field(&mut self, number: u32, value: WireValue<'_>, cx: &mut DecodeContext) -> bool {
        let meta = Arc::clone(&self.meta);
        let Some(field) = meta.field(number) else {
            return false;
        };

        match (field.kind(), field.is_repeated(), value) {
            (FieldKind::Message, repeated, WireValue::Bytes(data)) => {
                if let Some(nested) = self.decode_nested(field, data, cx) {
                    if repeated {
                        self.push_unchecked(number, Value::Message(nested));
                    } else {
                        self.values.insert(number, Value::Message(nested));
                    }
                }
            }
            (FieldKind::Scalar(s), true, WireValue::Bytes(data)) if s.is_packable() => {
                for item in decode_packed(s, data, number, cx) {
                    self.push_unchecked(number, item);
                }
            }
            (FieldKind::Scalar(s), repeated, wire) => match scalar_from_wire(s, &wire) {
                Ok(v) if repeated => self.push_unchecked(number, v),
                Ok(v) => {
                    self.values.insert(number, v);
                }
                Err(msg) => cx.mismatch(number, format!("{}.{}: {msg}", meta.name(), field.name())),
            },
            (FieldKind::Message, _, wire) => cx.mismatch(
                number,
                format!(
                    "{}.{}: expected length-delimited message, got {}",
                    meta.name(),
                    field.name(),
                    wire.wire_type().as_str()
                ),
            ),
        }
        true
    }
}

impl PartialEq for GenericMessage {
    /// Semantic equality: same message type and the same effective value
    /// in every field. An unset field equals a stored one at its default;
    /// defaults are never materialized.
    fn eq(&self, other: &Self) -> bool {
        if self.meta.id() != other.meta.id() || self.meta.name() != other.meta.name() {
            return false;
        }
        self.meta.fields().iter().all(|f| {
            match (self.values.get(&f.number()), other.values.get(&f.number())) {
                (Some(a), Some(b)) => a == b,
                (Some(_), None) => self.field_at_default(f),
                (None, Some(_)) => other.field_at_default(f),
                (None, None) => true,
            }
        })
    }
}

impl fmt::Debug for GenericMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.meta.name());
        for (n, v) in &self.values {
            let name = self.meta.field(*n).map(MetaField::name).unwrap_or("?");
            s.field(name, v);
        }
        s.finish()
    }
}
