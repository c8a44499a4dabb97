//! Statically typed transport envelope.
//!
//! `Envelope` and `TimeStamp` implement [`Visitable`] by hand, so they run
//! through the same encoder, decoder and JSON visitor as schema-driven
//! messages. An envelope carries one encoded message plus its id.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::{Map, Value as Json};

use crate::codec::{encode, scalar_from_wire, DecodeContext, ProtoDecoder, WireValue};
use crate::error::{Decoded, Result};
use crate::json::{to_json_value, JsonKeys, JsonOptions};
use crate::message::{FieldInfo, GenericMessage, Value, Visitable, Visitor};
use crate::schema::{ScalarType, Schema};

pub const ENVELOPE_ID: i32 = 1;
pub const TIMESTAMP_ID: i32 = 12;

/// Definition text equivalent to the hand-written types below.
pub const ENVELOPE_DEFINITIONS: &str = "\
message TimeStamp [id = 12] {
    int32 seconds = 1;
    int32 microseconds = 2;
}
message Envelope [id = 1] {
    int32 dataType = 1;
    bytes serializedData = 2;
    TimeStamp sent = 3;
    TimeStamp received = 4;
    TimeStamp sampleTimeStamp = 5;
    uint32 senderStamp = 6;
}
";

/// Wall-clock instant with microsecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeStamp {
    pub seconds: i32,
    pub microseconds: i32,
}

impl TimeStamp {
    pub fn now() -> Self {
        let since = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            seconds: i32::try_from(since.as_secs()).unwrap_or(i32::MAX),
            microseconds: since.subsec_micros() as i32,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.microseconds == 0
    }

    /// Microseconds since the epoch.
    pub fn as_micros(&self) -> i64 {
        self.seconds as i64 * 1_000_000 + self.microseconds as i64
    }
}

fn info(number: u32, name: &str, at_default: bool) -> FieldInfo<'_> {
    FieldInfo {
        number,
        name,
        at_default,
    }
}

fn read_i32(number: u32, value: &WireValue<'_>, cx: &mut DecodeContext) -> Option<i32> {
    match scalar_from_wire(ScalarType::Int32, value) {
        Ok(Value::Int32(n)) => Some(n),
        Ok(_) => None,
        Err(msg) => {
            cx.mismatch(number, msg);
            None
        }
    }
}

// A zero stamp reads back the same as one never sent.
fn visit_stamp(visitor: &mut dyn Visitor, field: FieldInfo<'_>, stamp: &TimeStamp) {
    if stamp.is_zero() {
        visitor.visit_unset_message(field, "TimeStamp");
    } else {
        visitor.visit_message(field, stamp);
    }
}

impl Visitable for TimeStamp {
    fn message_id(&self) -> i32 {
        TIMESTAMP_ID
    }

    fn message_name(&self) -> &str {
        "TimeStamp"
    }

    fn accept(&self, visitor: &mut dyn Visitor) {
        visitor.begin_message(TIMESTAMP_ID, "TimeStamp");
        visitor.visit_signed(info(1, "seconds", self.seconds == 0), 32, self.seconds as i64);
        visitor.visit_signed(
            info(2, "microseconds", self.microseconds == 0),
            32,
            self.microseconds as i64,
        );
        visitor.end_message();
    }

    fn visit_field(&mut self, number: u32, value: WireValue<'_>, cx: &mut DecodeContext) -> bool {
        match number {
            1 => {
                if let Some(n) = read_i32(number, &value, cx) {
                    self.seconds = n;
                }
            }
            2 => {
                if let Some(n) = read_i32(number, &value, cx) {
                    self.microseconds = n;
                }
            }
            _ => return false,
        }
        true
    }
}

/// One message in transit: id, encoded payload and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub data_type: i32,
    pub serialized_data: Vec<u8>,
    pub sent: TimeStamp,
    pub received: TimeStamp,
    pub sample_time_stamp: TimeStamp,
    pub sender_stamp: u32,
}

impl Envelope {
    /// Encode `message` and stamp it as sent now.
    pub fn wrap(message: &GenericMessage, sender_stamp: u32) -> Self {
        let now = TimeStamp::now();
        Self {
            data_type: message.meta().id(),
            serialized_data: encode(message).to_vec(),
            sent: now,
            received: TimeStamp::default(),
            sample_time_stamp: now,
            sender_stamp,
        }
    }

    /// Decode the payload with the message type named by `data_type`.
    pub fn unwrap_payload(&self, schema: &Arc<Schema>) -> Result<Decoded<GenericMessage>> {
        GenericMessage::decode_by_id(schema, self.data_type, &self.serialized_data)
    }

    pub fn encode(&self) -> Bytes {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Decoded<Envelope> {
        let mut env = Envelope::default();
        let diagnostics = ProtoDecoder::new(bytes).decode_into(&mut env);
        Decoded::new(env, diagnostics)
    }
}

impl Visitable for Envelope {
    fn message_id(&self) -> i32 {
        ENVELOPE_ID
    }

    fn message_name(&self) -> &str {
        "Envelope"
    }

    fn accept(&self, visitor: &mut dyn Visitor) {
        visitor.begin_message(ENVELOPE_ID, "Envelope");
        visitor.visit_signed(info(1, "dataType", self.data_type == 0), 32, self.data_type as i64);
        visitor.visit_bytes(
            info(2, "serializedData", self.serialized_data.is_empty()),
            &self.serialized_data,
        );
        visit_stamp(visitor, info(3, "sent", self.sent.is_zero()), &self.sent);
        visit_stamp(visitor, info(4, "received", self.received.is_zero()), &self.received);
        visit_stamp(
            visitor,
            info(5, "sampleTimeStamp", self.sample_time_stamp.is_zero()),
            &self.sample_time_stamp,
        );
        visitor.visit_unsigned(
            info(6, "senderStamp", self.sender_stamp == 0),
            32,
            self.sender_stamp as u64,
        );
        visitor.end_message();
    }

    fn visit_field(&mut self, number: u32, value: WireValue<'_>, cx: &mut DecodeContext) -> bool {
        match (number, value) {
            (1, v) => {
                if let Some(n) = read_i32(number, &v, cx) {
                    self.data_type = n;
                }
            }
            (2, WireValue::Bytes(b)) => self.serialized_data = b.to_vec(),
            (3, WireValue::Bytes(b)) => {
                cx.decode_nested(b, &mut self.sent);
            }
            (4, WireValue::Bytes(b)) => {
                cx.decode_nested(b, &mut self.received);
            }
            (5, WireValue::Bytes(b)) => {
                cx.decode_nested(b, &mut self.sample_time_stamp);
            }
            (6, v) => match scalar_from_wire(ScalarType::UInt32, &v) {
                Ok(Value::UInt32(n)) => self.sender_stamp = n,
                Ok(_) => {}
                Err(msg) => cx.mismatch(number, msg),
            },
            (2..=5, v) => cx.mismatch(
                number,
                format!(
                    "Envelope field {number}: expected length-delimited, got {}",
                    v.wire_type().as_str()
                ),
            ),
            _ => return false,
        }
        true
    }
}

/// Render `envelope` as JSON with the payload decoded and nested under its
/// message name. Payloads of unknown type stay base64.
pub fn envelope_to_json(
    envelope: &Envelope,
    schema: &Arc<Schema>,
    options: JsonOptions,
) -> Decoded<Json> {
    let mut json = to_json_value(envelope, options);
    let Ok(payload) = envelope.unwrap_payload(schema) else {
        return Decoded::new(json, Vec::new());
    };
    let key = match options.keys {
        JsonKeys::Number => "2",
        JsonKeys::Name => "serializedData",
    };
    let name = payload.value.meta().name().to_string();
    let mut nested = Map::new();
    nested.insert(name, to_json_value(&payload.value, options));
    if let Json::Object(obj) = &mut json {
        obj.insert(key.to_string(), Json::Object(nested));
    }
    Decoded::new(json, payload.diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse;

    fn point_schema() -> Arc<Schema> {
        Arc::new(parse("message Point [id = 42] { double x = 1; double y = 2; }").value)
    }

    fn sample() -> Envelope {
        Envelope {
            data_type: 42,
            serialized_data: vec![0x09, 0, 0, 0, 0, 0, 0, 0x0c, 0x40],
            sent: TimeStamp {
                seconds: 1_700_000_000,
                microseconds: 250,
            },
            received: TimeStamp::default(),
            sample_time_stamp: TimeStamp {
                seconds: -5,
                microseconds: 0,
            },
            sender_stamp: 7,
        }
    }

    #[test]
    fn envelope_round_trip() {
        let env = sample();
        let back = Envelope::decode(&env.encode());
        assert!(back.is_clean(), "{:?}", back.diagnostics);
        assert_eq!(back.value, env);
    }

    #[test]
    fn hand_written_types_agree_with_definitions() {
        let out = parse(ENVELOPE_DEFINITIONS);
        assert!(out.is_clean(), "{:?}", out.diagnostics);
        let schema = Arc::new(out.value);
        let env = sample();
        let bytes = env.encode();

        let generic = GenericMessage::decode(&schema, "Envelope", &bytes).unwrap();
        assert!(generic.is_clean());
        assert_eq!(crate::codec::encode(&generic.value), bytes);
        assert_eq!(generic.value.value(6).as_deref(), Some(&Value::UInt32(7)));
        assert_eq!(
            to_json_value(&generic.value, JsonOptions::with_keys(JsonKeys::Name)),
            to_json_value(&env, JsonOptions::with_keys(JsonKeys::Name))
        );
    }

    #[test]
    fn wrap_and_unwrap_payload() {
        let schema = point_schema();
        let mut p = GenericMessage::new(&schema, "Point").unwrap();
        p.set_value(1, 3.5f64);
        let env = Envelope::wrap(&p, 3);
        assert_eq!(env.data_type, 42);
        assert_eq!(env.sender_stamp, 3);
        assert!(!env.sent.is_zero());

        let payload = env.unwrap_payload(&schema).unwrap();
        assert!(payload.is_clean());
        assert_eq!(payload.value, p);

        let unknown = Envelope {
            data_type: 999,
            ..env
        };
        assert!(unknown.unwrap_payload(&schema).is_err());
    }

    #[test]
    fn json_nests_the_payload_by_name() {
        let schema = point_schema();
        let out = envelope_to_json(&sample(), &schema, JsonOptions::with_keys(JsonKeys::Name));
        assert!(out.is_clean());
        assert_eq!(out.value["serializedData"], serde_json::json!({"Point": {"x": 3.5, "y": 0.0}}));
        assert_eq!(out.value["sent"]["microseconds"], 250);
        assert_eq!(out.value["senderStamp"], 7);
    }

    #[test]
    fn wrong_wire_type_is_reported() {
        // field 3 as varint
        let decoded = Envelope::decode(&[0x18, 0x01, 0x30, 0x02]);
        assert_eq!(decoded.diagnostics.len(), 1);
        assert_eq!(decoded.value.sender_stamp, 2);
    }
}
