//! JSON rendering and permissive, schema-driven JSON reading.
//!
//! Output keeps every field (defaults included) in ascending field-number
//! order. A nested message that was never set renders as `{}`. Bytes are
//! standard base64; non-finite floats become `null`.

use std::sync::Arc;

use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Number, Value as Json};
use tracing::debug;

use crate::error::{Decoded, Diagnostic, Diagnostics, ErrorKind, MetaWireError, Position, Result};
use crate::message::{visit_scalar, FieldInfo, GenericMessage, Value, Visitable, Visitor};
use crate::schema::{FieldKind, MetaField, ScalarType, Schema};

/// How object keys are spelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonKeys {
    /// Decimal field number (`"1"`).
    #[default]
    Number,
    /// Declared field name (`"x"`).
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    pub keys: JsonKeys,
    pub pretty: bool,
}

impl JsonOptions {
    pub fn with_keys(keys: JsonKeys) -> Self {
        Self { keys, pretty: false }
    }
}

/// Visitor building one JSON object.
#[derive(Debug, Default)]
pub struct JsonVisitor {
    options: JsonOptions,
    object: Map<String, Json>,
}

impl JsonVisitor {
    pub fn new(options: JsonOptions) -> Self {
        Self {
            options,
            object: Map::new(),
        }
    }

    pub fn into_value(self) -> Json {
        Json::Object(self.object)
    }

    fn key(&self, field: &FieldInfo<'_>) -> String {
        match self.options.keys {
            JsonKeys::Number => field.number.to_string(),
            JsonKeys::Name => field.name.to_string(),
        }
    }

    fn put(&mut self, field: &FieldInfo<'_>, value: Json) {
        let key = self.key(field);
        self.object.insert(key, value);
    }

    fn nested(&self, value: &dyn Visitable) -> Json {
        let mut child = JsonVisitor::new(self.options);
        value.accept(&mut child);
        child.into_value()
    }
}

fn float_json(x: f64) -> Json {
    Number::from_f64(x).map(Json::Number).unwrap_or(Json::Null)
}

// Goes through the shortest f32 text so 0.1f32 renders as 0.1.
fn f32_json(x: f32) -> Json {
    match x.to_string().parse::<f64>() {
        Ok(wide) => float_json(wide),
        Err(_) => Json::Null,
    }
}

fn base64_json(bytes: &[u8]) -> Json {
    Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
}

impl Visitor for JsonVisitor {
    fn visit_bool(&mut self, field: FieldInfo<'_>, value: bool) {
        self.put(&field, Json::Bool(value));
    }

    fn visit_signed(&mut self, field: FieldInfo<'_>, _width: u32, value: i64) {
        self.put(&field, Json::from(value));
    }

    fn visit_unsigned(&mut self, field: FieldInfo<'_>, _width: u32, value: u64) {
        self.put(&field, Json::from(value));
    }

    fn visit_fixed32(&mut self, field: FieldInfo<'_>, value: u32) {
        self.put(&field, Json::from(value));
    }

    fn visit_fixed64(&mut self, field: FieldInfo<'_>, value: u64) {
        self.put(&field, Json::from(value));
    }

    fn visit_sfixed32(&mut self, field: FieldInfo<'_>, value: i32) {
        self.put(&field, Json::from(value));
    }

    fn visit_sfixed64(&mut self, field: FieldInfo<'_>, value: i64) {
        self.put(&field, Json::from(value));
    }

    fn visit_float(&mut self, field: FieldInfo<'_>, value: f32) {
        self.put(&field, f32_json(value));
    }

    fn visit_double(&mut self, field: FieldInfo<'_>, value: f64) {
        self.put(&field, float_json(value));
    }

    fn visit_string(&mut self, field: FieldInfo<'_>, value: &str) {
        self.put(&field, Json::String(value.to_string()));
    }

    fn visit_bytes(&mut self, field: FieldInfo<'_>, value: &[u8]) {
        self.put(&field, base64_json(value));
    }

    fn visit_message(&mut self, field: FieldInfo<'_>, value: &dyn Visitable) {
        let nested = self.nested(value);
        self.put(&field, nested);
    }

    fn visit_unset_message(&mut self, field: FieldInfo<'_>, _type_name: &str) {
        self.put(&field, Json::Object(Map::new()));
    }

    fn visit_repeated(&mut self, field: FieldInfo<'_>, kind: FieldKind, values: &[Value]) {
        let items = values
            .iter()
            .map(|v| match (kind, v) {
                (FieldKind::Message, Value::Message(m)) => self.nested(m),
                (FieldKind::Scalar(ty), v) => {
                    // reuse the scalar callbacks through a throwaway visitor
                    let mut one = JsonVisitor::new(self.options);
                    visit_scalar(&mut one, field, ty, v);
                    one.object.into_iter().next().map(|(_, j)| j).unwrap_or(Json::Null)
                }
                _ => Json::Null,
            })
            .collect();
        self.put(&field, Json::Array(items));
    }
}

/// Render any visitable message as a JSON value.
pub fn to_json_value(message: &dyn Visitable, options: JsonOptions) -> Json {
    let mut visitor = JsonVisitor::new(options);
    message.accept(&mut visitor);
    visitor.into_value()
}

/// Render any visitable message as JSON text.
pub fn to_json(message: &dyn Visitable, options: JsonOptions) -> String {
    let value = to_json_value(message, options);
    let text = if options.pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    text.unwrap_or_default()
}

/// Read JSON text into a message of type `name`. Unparsable text or a
/// non-object root yields the empty message plus a `SyntaxError`.
pub fn from_json(text: &str, schema: &Arc<Schema>, name: &str) -> Result<Decoded<GenericMessage>> {
    match serde_json::from_str::<Json>(text) {
        Ok(json) => from_json_value(&json, schema, name),
        Err(e) => {
            let msg = GenericMessage::new(schema, name)
                .ok_or_else(|| MetaWireError::UnknownMessage(name.to_string()))?;
            let d = Diagnostic::syntax(e.line() as u32, e.column() as u32, e.to_string());
            Ok(Decoded::new(msg, vec![d]))
        }
    }
}

pub fn from_json_value(
    json: &Json,
    schema: &Arc<Schema>,
    name: &str,
) -> Result<Decoded<GenericMessage>> {
    let mut msg = GenericMessage::new(schema, name)
        .ok_or_else(|| MetaWireError::UnknownMessage(name.to_string()))?;
    let mut diagnostics = Diagnostics::new();
    match json {
        Json::Object(obj) => fill(&mut msg, obj, &mut diagnostics),
        other => diagnostics.push(Diagnostic::new(
            ErrorKind::SyntaxError,
            Position::None,
            format!("expected a JSON object for {name}, got {}", json_kind(other)),
        )),
    }
    Ok(Decoded::new(msg, diagnostics))
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn fill(msg: &mut GenericMessage, obj: &Map<String, Json>, diagnostics: &mut Diagnostics) {
    for (key, json) in obj {
        let meta = msg.meta();
        let field = match key.parse::<u32>() {
            Ok(n) => meta.field(n),
            Err(_) => meta.field_by_name(key),
        };
        let Some(field) = field.cloned() else {
            debug!(message = meta.name(), key = key.as_str(), "ignoring unknown JSON key");
            continue;
        };

        if field.is_repeated() {
            let Json::Array(items) = json else {
                diagnostics.push(mismatch(msg, &field, "array", json));
                continue;
            };
            let mut values = Vec::with_capacity(items.len());
            let mut ok = true;
            for item in items {
                match element_from_json(msg, &field, item, diagnostics) {
                    Some(v) => values.push(v),
                    None => {
                        diagnostics.push(mismatch(
                            msg,
                            &field,
                            field.field_type().type_name(),
                            item,
                        ));
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                msg.set_value(field.number(), Value::List(values));
            }
        } else {
            match element_from_json(msg, &field, json, diagnostics) {
                Some(v) => {
                    msg.set_value(field.number(), v);
                }
                None => {
                    let expected = field.field_type().type_name();
                    diagnostics.push(mismatch(msg, &field, expected, json));
                }
            }
        }
    }
}

fn mismatch(msg: &GenericMessage, field: &MetaField, expected: &str, got: &Json) -> Diagnostic {
    Diagnostic::mismatch(
        field.number(),
        format!(
            "{}.{}: expected {expected}, got {}",
            msg.meta().name(),
            field.name(),
            json_kind(got)
        ),
    )
}

fn element_from_json(
    msg: &GenericMessage,
    field: &MetaField,
    json: &Json,
    diagnostics: &mut Diagnostics,
) -> Option<Value> {
    match field.kind() {
        FieldKind::Message => {
            let Json::Object(obj) = json else { return None };
            let mut nested = msg.empty_nested(field)?;
            fill(&mut nested, obj, diagnostics);
            Some(Value::Message(nested))
        }
        FieldKind::Scalar(ty) => scalar_from_json(ty, json),
    }
}

/// Convert one JSON scalar to `ty`, range checked.
pub fn scalar_from_json(ty: ScalarType, json: &Json) -> Option<Value> {
    match ty {
        ScalarType::Bool => json.as_bool().map(Value::Bool),
        ScalarType::Int8
        | ScalarType::Int16
        | ScalarType::Int32
        | ScalarType::Int64
        | ScalarType::SFixed32
        | ScalarType::SFixed64 => ty.signed_value(json.as_i64()?),
        ScalarType::UInt8
        | ScalarType::UInt16
        | ScalarType::UInt32
        | ScalarType::UInt64
        | ScalarType::Fixed32
        | ScalarType::Fixed64 => ty.unsigned_value(json.as_u64()?),
        ScalarType::Float => json.as_f64().map(|x| Value::Float(x as f32)),
        ScalarType::Double => json.as_f64().map(Value::Double),
        ScalarType::String => json.as_str().map(|s| Value::String(s.to_string())),
        ScalarType::Bytes => base64::engine::general_purpose::STANDARD
            .decode(json.as_str()?)
            .ok()
            .map(Value::Bytes),
    }
}
