//! Compiled type model: `MetaMessage`, `MetaField` and the closed field-type set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::message::Value;
use crate::wire::WireType;

/// Primitive field types understood by every visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarType {
    /// Resolve a type keyword of the definition language.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let t = match word {
            "bool" => ScalarType::Bool,
            "int8" | "char" => ScalarType::Int8,
            "uint8" | "byte" => ScalarType::UInt8,
            "int16" => ScalarType::Int16,
            "uint16" => ScalarType::UInt16,
            "int32" => ScalarType::Int32,
            "uint32" => ScalarType::UInt32,
            "int64" => ScalarType::Int64,
            "uint64" => ScalarType::UInt64,
            "fixed32" => ScalarType::Fixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed32" => ScalarType::SFixed32,
            "sfixed64" => ScalarType::SFixed64,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        };
        Some(t)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::UInt8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::UInt16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::SFixed32 => "sfixed32",
            ScalarType::SFixed64 => "sfixed64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Natural wire type of a single value.
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::SFixed32 => WireType::Fixed32,
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::SFixed64 => WireType::Fixed64,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        }
    }

    /// Bit width of integer types (0 for the rest).
    pub fn bit_width(self) -> u32 {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 8,
            ScalarType::Int16 | ScalarType::UInt16 => 16,
            ScalarType::Int32
            | ScalarType::UInt32
            | ScalarType::Fixed32
            | ScalarType::SFixed32 => 32,
            ScalarType::Int64
            | ScalarType::UInt64
            | ScalarType::Fixed64
            | ScalarType::SFixed64 => 64,
            _ => 0,
        }
    }

    /// Repeated values of this type are packed into one length-delimited run.
    pub fn is_packable(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Value a field of this type holds when nothing else was said.
    pub fn zero_value(self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int8 => Value::Int8(0),
            ScalarType::UInt8 => Value::UInt8(0),
            ScalarType::Int16 => Value::Int16(0),
            ScalarType::UInt16 => Value::UInt16(0),
            ScalarType::Int32 | ScalarType::SFixed32 => Value::Int32(0),
            ScalarType::UInt32 | ScalarType::Fixed32 => Value::UInt32(0),
            ScalarType::Int64 | ScalarType::SFixed64 => Value::Int64(0),
            ScalarType::UInt64 | ScalarType::Fixed64 => Value::UInt64(0),
            ScalarType::Float => Value::Float(0.0),
            ScalarType::Double => Value::Double(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Does `value` carry this type's variant?
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarType::Bool, Value::Bool(_))
                | (ScalarType::Int8, Value::Int8(_))
                | (ScalarType::UInt8, Value::UInt8(_))
                | (ScalarType::Int16, Value::Int16(_))
                | (ScalarType::UInt16, Value::UInt16(_))
                | (ScalarType::Int32 | ScalarType::SFixed32, Value::Int32(_))
                | (ScalarType::UInt32 | ScalarType::Fixed32, Value::UInt32(_))
                | (ScalarType::Int64 | ScalarType::SFixed64, Value::Int64(_))
                | (ScalarType::UInt64 | ScalarType::Fixed64, Value::UInt64(_))
                | (ScalarType::Float, Value::Float(_))
                | (ScalarType::Double, Value::Double(_))
                | (ScalarType::String, Value::String(_))
                | (ScalarType::Bytes, Value::Bytes(_))
        )
    }

    /// Build a value of this type from a signed integer, if it fits.
    pub fn signed_value(self, n: i64) -> Option<Value> {
        let v = match self {
            ScalarType::Int8 => Value::Int8(i8::try_from(n).ok()?),
            ScalarType::Int16 => Value::Int16(i16::try_from(n).ok()?),
            ScalarType::Int32 | ScalarType::SFixed32 => Value::Int32(i32::try_from(n).ok()?),
            ScalarType::Int64 | ScalarType::SFixed64 => Value::Int64(n),
            ScalarType::UInt8
            | ScalarType::UInt16
            | ScalarType::UInt32
            | ScalarType::UInt64
            | ScalarType::Fixed32
            | ScalarType::Fixed64 => return self.unsigned_value(u64::try_from(n).ok()?),
            ScalarType::Float => Value::Float(n as f32),
            ScalarType::Double => Value::Double(n as f64),
            _ => return None,
        };
        Some(v)
    }

    /// Build a value of this type from an unsigned integer, if it fits.
    pub fn unsigned_value(self, n: u64) -> Option<Value> {
        let v = match self {
            ScalarType::UInt8 => Value::UInt8(u8::try_from(n).ok()?),
            ScalarType::UInt16 => Value::UInt16(u16::try_from(n).ok()?),
            ScalarType::UInt32 | ScalarType::Fixed32 => Value::UInt32(u32::try_from(n).ok()?),
            ScalarType::UInt64 | ScalarType::Fixed64 => Value::UInt64(n),
            ScalarType::Int8
            | ScalarType::Int16
            | ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::SFixed32
            | ScalarType::SFixed64 => return self.signed_value(i64::try_from(n).ok()?),
            ScalarType::Float => Value::Float(n as f32),
            ScalarType::Double => Value::Double(n as f64),
            _ => return None,
        };
        Some(v)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    /// Fully qualified name of another message in the same schema.
    Message(String),
}

impl FieldType {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Scalar(s) => FieldKind::Scalar(*s),
            FieldType::Message(_) => FieldKind::Message,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Scalar(s) => s.keyword(),
            FieldType::Message(name) => name,
        }
    }
}

/// Copyable summary of a field type, handed to visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarType),
    Message,
}

impl FieldKind {
    pub fn wire_type(self) -> WireType {
        match self {
            FieldKind::Scalar(s) => s.wire_type(),
            FieldKind::Message => WireType::LengthDelimited,
        }
    }
}

/// One field of a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaField {
    number: u32,
    name: String,
    field_type: FieldType,
    repeated: bool,
    default_value: Option<Value>,
}

impl MetaField {
    /// Field whose default is its type's zero value.
    pub fn new(
        number: u32,
        name: impl Into<String>,
        field_type: FieldType,
        repeated: bool,
    ) -> Self {
        let default_value = match (&field_type, repeated) {
            (_, true) => Some(Value::List(Vec::new())),
            (FieldType::Scalar(s), false) => Some(s.zero_value()),
            (FieldType::Message(_), false) => None,
        };
        Self {
            number,
            name: name.into(),
            field_type,
            repeated,
            default_value,
        }
    }

    /// Replace the default of a singular scalar field; ignored when the
    /// value does not match the declared type.
    pub fn with_default(mut self, value: Value) -> Self {
        if let (FieldType::Scalar(s), false) = (&self.field_type, self.repeated) {
            if s.matches(&value) {
                self.default_value = Some(value);
            }
        }
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn kind(&self) -> FieldKind {
        self.field_type.kind()
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Declared default. `None` for singular message fields, whose default
    /// is an empty instance of the nested type.
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Does `value` fit this field's declared type? Nested message values
    /// are checked by message name only.
    pub fn accepts(&self, value: &Value) -> bool {
        if self.repeated {
            return match value {
                Value::List(items) => items.iter().all(|v| self.accepts_element(v)),
                _ => false,
            };
        }
        self.accepts_element(value)
    }

    pub(crate) fn accepts_element(&self, value: &Value) -> bool {
        match (&self.field_type, value) {
            (FieldType::Scalar(s), v) => s.matches(v),
            (FieldType::Message(name), Value::Message(m)) => m.meta().name() == name,
            _ => false,
        }
    }
}

/// Immutable description of one message type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaMessage {
    name: String,
    id: i32,
    fields: Vec<MetaField>,
    by_number: BTreeMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl MetaMessage {
    pub fn new(name: impl Into<String>, id: i32) -> Self {
        Self {
            name: name.into(),
            id,
            fields: Vec::new(),
            by_number: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Append a field in declaration order. Returns the field back when its
    /// number or name is already taken.
    pub fn add_field(&mut self, field: MetaField) -> std::result::Result<(), MetaField> {
        if self.by_number.contains_key(&field.number) || self.by_name.contains_key(&field.name) {
            return Err(field);
        }
        let idx = self.fields.len();
        self.by_number.insert(field.number, idx);
        self.by_name.insert(field.name.clone(), idx);
        self.fields.push(field);
        Ok(())
    }

    /// Builder form of [`MetaMessage::add_field`]; duplicates are dropped.
    pub fn with_field(mut self, field: MetaField) -> Self {
        let _ = self.add_field(field);
        self
    }

    /// Fully qualified name (`pkg.sub.Name`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the qualified name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Package prefix, empty for top-level messages.
    pub fn package(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) => &self.name[..i],
            None => "",
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[MetaField] {
        &self.fields
    }

    /// Fields in ascending field-number order.
    pub fn fields_by_number(&self) -> impl Iterator<Item = &MetaField> + '_ {
        self.by_number.values().filter_map(|&i| self.fields.get(i))
    }

    pub fn field(&self, number: u32) -> Option<&MetaField> {
        self.by_number.get(&number).and_then(|&i| self.fields.get(i))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&MetaField> {
        self.by_name.get(name).and_then(|&i| self.fields.get(i))
    }
}

/// All message types produced by one parse, indexed by name and id.
///
/// Message types are held behind `Arc` so runtime messages can keep a
/// cheap read-only handle to their type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    messages: Vec<Arc<MetaMessage>>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<i32, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message type. Returns it back when its name or id is taken.
    pub fn insert(&mut self, message: MetaMessage) -> std::result::Result<(), MetaMessage> {
        if self.by_name.contains_key(message.name()) || self.by_id.contains_key(&message.id()) {
            return Err(message);
        }
        let idx = self.messages.len();
        self.by_name.insert(message.name().to_string(), idx);
        self.by_id.insert(message.id(), idx);
        self.messages.push(Arc::new(message));
        Ok(())
    }

    /// Builder form of [`Schema::insert`]; conflicting types are dropped.
    pub fn with_message(mut self, message: MetaMessage) -> Self {
        let _ = self.insert(message);
        self
    }

    /// Message types in declaration order.
    pub fn messages(&self) -> &[Arc<MetaMessage>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MetaMessage> {
        self.get_arc(name).map(|m| m.as_ref())
    }

    pub fn get_by_id(&self, id: i32) -> Option<&MetaMessage> {
        self.get_arc_by_id(id).map(|m| m.as_ref())
    }

    pub fn get_arc(&self, name: &str) -> Option<&Arc<MetaMessage>> {
        self.by_name.get(name).and_then(|&i| self.messages.get(i))
    }

    pub fn get_arc_by_id(&self, id: i32) -> Option<&Arc<MetaMessage>> {
        self.by_id.get(&id).and_then(|&i| self.messages.get(i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_by_number_and_name() {
        let meta = MetaMessage::new("geo.Point", 7)
            .with_field(MetaField::new(2, "y", FieldType::Scalar(ScalarType::Double), false))
            .with_field(MetaField::new(1, "x", FieldType::Scalar(ScalarType::Double), false));

        assert_eq!(meta.short_name(), "Point");
        assert_eq!(meta.package(), "geo");
        assert_eq!(meta.field(1).map(MetaField::name), Some("x"));
        assert_eq!(meta.field_by_name("y").map(MetaField::number), Some(2));
        assert_eq!(meta.fields()[0].name(), "y");
        let ordered: Vec<u32> = meta.fields_by_number().map(MetaField::number).collect();
        assert_eq!(ordered, vec![1, 2]);
    }

    #[test]
    fn duplicate_fields_are_refused() {
        let mut meta = MetaMessage::new("A", 1);
        let f = MetaField::new(1, "a", FieldType::Scalar(ScalarType::Int32), false);
        assert!(meta.add_field(f.clone()).is_ok());
        assert!(meta.add_field(f).is_err());
        assert!(meta
            .add_field(MetaField::new(2, "a", FieldType::Scalar(ScalarType::Int32), false))
            .is_err());
        assert_eq!(meta.fields().len(), 1);
    }

    #[test]
    fn defaults_follow_declared_type() {
        let f = MetaField::new(1, "n", FieldType::Scalar(ScalarType::UInt16), false);
        assert_eq!(f.default_value(), Some(&Value::UInt16(0)));

        let f = f.with_default(Value::UInt16(9));
        assert_eq!(f.default_value(), Some(&Value::UInt16(9)));

        let f = f.with_default(Value::Int32(1));
        assert_eq!(f.default_value(), Some(&Value::UInt16(9)));

        let r = MetaField::new(2, "r", FieldType::Scalar(ScalarType::Int32), true);
        assert_eq!(r.default_value(), Some(&Value::List(Vec::new())));
        assert!(r.accepts(&Value::List(vec![Value::Int32(1)])));
        assert!(!r.accepts(&Value::Int32(1)));

        let m = MetaField::new(3, "m", FieldType::Message("P".into()), false);
        assert!(m.default_value().is_none());
    }

    #[test]
    fn schema_rejects_duplicate_name_or_id() {
        let mut schema = Schema::new();
        assert!(schema.insert(MetaMessage::new("A", 1)).is_ok());
        assert!(schema.insert(MetaMessage::new("A", 2)).is_err());
        assert!(schema.insert(MetaMessage::new("B", 1)).is_err());
        assert!(schema.insert(MetaMessage::new("B", 2)).is_ok());
        assert_eq!(schema.get_by_id(2).map(MetaMessage::name), Some("B"));
        assert_eq!(schema.index_of("A"), Some(0));
    }

    #[test]
    fn scalar_range_conversions() {
        assert_eq!(ScalarType::Int8.signed_value(-128), Some(Value::Int8(-128)));
        assert_eq!(ScalarType::Int8.signed_value(128), None);
        assert_eq!(ScalarType::UInt8.signed_value(-1), None);
        assert_eq!(ScalarType::UInt32.signed_value(7), Some(Value::UInt32(7)));
        assert_eq!(ScalarType::Int64.unsigned_value(u64::MAX), None);
        assert_eq!(ScalarType::Fixed64.unsigned_value(u64::MAX), Some(Value::UInt64(u64::MAX)));
        assert_eq!(ScalarType::Double.signed_value(-2), Some(Value::Double(-2.0)));
        assert_eq!(ScalarType::String.signed_value(1), None);
    }
}
