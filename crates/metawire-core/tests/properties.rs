//! Codec and parser properties over a schema exercising every field type.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use metawire_core::error::ErrorKind;
use metawire_core::json::{from_json, to_json, JsonKeys, JsonOptions};
use metawire_core::{
    encode, encode_with, parse, EncodeOptions, GenericMessage, MetaField, Schema, Value,
};

const DEFINITIONS: &str = r#"
// sensor data, nested one level
package demo : 100 {
    message Vec3 {
        float x = 1;
        float y = 2;
        float z = 3;
    }

    message Reading {
        bool valid = 1;
        char c = 2;
        byte b = 3;
        int16 i16 = 4;
        uint16 u16 = 5;
        int32 i32 = 6;
        uint32 u32 = 7;
        int64 i64 = 8;
        uint64 u64 = 9;
        fixed32 f32 = 10;
        fixed64 f64 = 11;
        sfixed32 s32 = 12;
        sfixed64 s64 = 13;
        double d = 14;
        string label = 15 [default = "unset"];
        bytes raw = 16;
        Vec3 accel = 17;
        repeated Vec3 trail = 18;
    }
}
"#;

fn schema() -> Arc<Schema> {
    let out = parse(DEFINITIONS);
    assert!(out.is_clean(), "{:?}", out.diagnostics);
    Arc::new(out.value)
}

fn vec3(s: &Arc<Schema>, x: f32, y: f32, z: f32) -> GenericMessage {
    let mut v = GenericMessage::new(s, "demo.Vec3").unwrap();
    v.set_value(1, x);
    v.set_value(2, y);
    v.set_value(3, z);
    v
}

fn full_reading(s: &Arc<Schema>) -> GenericMessage {
    let mut r = GenericMessage::new(s, "demo.Reading").unwrap();
    assert!(r.set_by_name("valid", true));
    assert!(r.set_by_name("c", i8::MIN));
    assert!(r.set_by_name("b", u8::MAX));
    assert!(r.set_by_name("i16", -300i16));
    assert!(r.set_by_name("u16", 40_000u16));
    assert!(r.set_by_name("i32", i32::MIN));
    assert!(r.set_by_name("u32", u32::MAX));
    assert!(r.set_by_name("i64", i64::MAX));
    assert!(r.set_by_name("u64", u64::MAX));
    assert!(r.set_by_name("f32", 7u32));
    assert!(r.set_by_name("f64", 1u64 << 40));
    assert!(r.set_by_name("s32", -7i32));
    assert!(r.set_by_name("s64", i64::MIN));
    assert!(r.set_by_name("d", -0.125f64));
    assert!(r.set_by_name("label", "front-left"));
    assert!(r.set_by_name("raw", vec![0u8, 1, 2, 255]));
    assert!(r.set_by_name("accel", vec3(s, 0.5, -9.81, 0.0)));
    assert!(r.push(18, vec3(s, 1.0, 2.0, 3.0)));
    assert!(r.push(18, vec3(s, 0.0, 0.0, 0.0)));
    assert_eq!(r.rejected_count(), 0);
    r
}

#[test]
fn encode_then_decode_is_identity() {
    let s = schema();
    let r = full_reading(&s);
    let bytes = encode(&r);
    let back = GenericMessage::decode(&s, "demo.Reading", &bytes).unwrap();
    assert!(back.is_clean(), "{:?}", back.diagnostics);
    assert_eq!(back.value, r);
}

#[test]
fn explicit_defaults_are_not_observable() {
    let s = schema();
    let mut r = GenericMessage::new(&s, "demo.Reading").unwrap();
    r.set_by_name("label", "unset");
    r.set_by_name("i32", 0i32);
    assert!(encode(&r).is_empty());

    let back = GenericMessage::decode(&s, "demo.Reading", &encode(&r)).unwrap().value;
    assert!(!back.is_set(15));
    assert_eq!(back, r);

    // forced defaults decode to the same message
    let forced = encode_with(&r, EncodeOptions { emit_defaults: true });
    assert!(!forced.is_empty());
    let back = GenericMessage::decode(&s, "demo.Reading", &forced).unwrap();
    assert!(back.is_clean());
    assert_eq!(back.value, r);
}

#[test]
fn unknown_field_is_invisible() {
    let s = schema();
    let r = full_reading(&s);
    let plain = encode(&r).to_vec();

    // append field 500 (length-delimited) and field 501 (fixed32)
    let mut extended = plain.clone();
    extended.extend_from_slice(&[0xa2, 0x1f, 0x02, 0xbe, 0xef]);
    extended.extend_from_slice(&[0xad, 0x1f, 1, 2, 3, 4]);

    let a = GenericMessage::decode(&s, "demo.Reading", &plain).unwrap();
    let b = GenericMessage::decode(&s, "demo.Reading", &extended).unwrap();
    assert!(b.is_clean(), "{:?}", b.diagnostics);
    assert_eq!(a.value, b.value);
}

#[test]
fn older_schema_reads_newer_bytes() {
    let newer =
        Arc::new(parse("message M [id = 5] { int32 a = 1; string b = 2; double c = 3; }").value);
    let older = Arc::new(parse("message M [id = 5] { int32 a = 1; }").value);

    let mut m = GenericMessage::new(&newer, "M").unwrap();
    m.set_value(1, 42i32);
    m.set_value(2, "extra");
    m.set_value(3, 1.5f64);

    let old = GenericMessage::decode_by_id(&older, 5, &encode(&m)).unwrap();
    assert!(old.is_clean());
    assert_eq!(old.value.value(1).as_deref(), Some(&Value::Int32(42)));

    // and the reverse: missing fields resolve to defaults
    let new = GenericMessage::decode(&newer, "M", &encode(&old.value)).unwrap();
    assert_eq!(new.value.value(2).as_deref(), Some(&Value::String(String::new())));
}

#[test]
fn truncation_at_every_offset_is_safe() {
    let s = schema();
    let bytes = encode(&full_reading(&s)).to_vec();
    assert!(bytes.len() > 60);

    for cut in 0..bytes.len() {
        let out = GenericMessage::decode(&s, "demo.Reading", &bytes[..cut]).unwrap();
        for d in &out.diagnostics {
            assert!(
                matches!(d.kind, ErrorKind::TruncatedInput),
                "cut={cut} unexpected {d}"
            );
        }
    }
}

#[test]
fn garbage_never_panics() {
    let s = schema();
    let mut state: u32 = 0x1234_5678;
    for len in 0..256usize {
        let buf: Vec<u8> = (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let _ = GenericMessage::decode(&s, "demo.Reading", &buf).unwrap();
    }
}

#[test]
fn parsing_is_deterministic() {
    let a = parse(DEFINITIONS).value;
    let b = parse(DEFINITIONS).value;
    assert_eq!(a, b);

    let ids: Vec<(String, i32)> =
        a.messages().iter().map(|m| (m.name().to_string(), m.id())).collect();
    assert_eq!(
        ids,
        vec![("demo.Vec3".to_string(), 100), ("demo.Reading".to_string(), 101)]
    );
    let reading = a.get("demo.Reading").unwrap();
    assert_eq!(reading.fields().len(), 18);
    assert_eq!(reading.field(17).map(|f| f.field_type().type_name()), Some("demo.Vec3"));
    assert_eq!(
        reading.field_by_name("c").and_then(MetaField::default_value),
        Some(&Value::Int8(0))
    );
}

#[test]
fn json_scenario_and_round_trip() {
    let s = Arc::new(parse("message Point { double x = 1; double y = 2; }").value);
    let mut p = GenericMessage::new(&s, "Point").unwrap();
    p.set_value(1, 3.5f64);
    p.set_value(2, -2.0f64);
    assert_eq!(to_json(&p, JsonOptions::default()), r#"{"1":3.5,"2":-2.0}"#);

    let rs = schema();
    let r = full_reading(&rs);
    for keys in [JsonKeys::Number, JsonKeys::Name] {
        let text = to_json(&r, JsonOptions::with_keys(keys));
        let back = from_json(&text, &rs, "demo.Reading").unwrap();
        assert!(back.is_clean(), "{:?}", back.diagnostics);
        assert_eq!(back.value, r);
    }
}

fn linked_list() -> Arc<Schema> {
    let out =
        parse("message Node [id = 7] { int32 v = 1; Node next = 2; repeated Node kids = 3; }");
    assert!(out.is_clean(), "{:?}", out.diagnostics);
    Arc::new(out.value)
}

#[test]
fn self_referential_types_render_and_compare() {
    let s = linked_list();
    let empty = GenericMessage::new(&s, "Node").unwrap();
    assert_eq!(empty, GenericMessage::new(&s, "Node").unwrap());
    assert_eq!(to_json(&empty, JsonOptions::default()), r#"{"1":0,"2":{},"3":[]}"#);
    assert!(encode(&empty).is_empty());

    let mut n = GenericMessage::new(&s, "Node").unwrap();
    n.set_value(1, 1i32);
    n.message_mut(2).unwrap().set_value(1, 2i32);
    assert!(n.push(3, empty.clone()));
    assert_eq!(
        to_json(&n, JsonOptions::with_keys(JsonKeys::Name)),
        r#"{"v":1,"next":{"v":2,"next":{},"kids":[]},"kids":[{"v":0,"next":{},"kids":[]}]}"#
    );

    // forced defaults stop at the first unset nested message
    let forced = encode_with(&empty, EncodeOptions { emit_defaults: true });
    assert_eq!(forced.as_ref(), &[0x08, 0x00, 0x12, 0x00]);
    let back = GenericMessage::decode(&s, "Node", &forced).unwrap();
    assert!(back.is_clean(), "{:?}", back.diagnostics);
    assert!(back.value.is_set(2));
    assert_eq!(back.value, empty);
}

#[test]
fn self_referential_round_trips() {
    let s = linked_list();
    let mut n = GenericMessage::new(&s, "Node").unwrap();
    n.set_value(1, -3i32);
    n.message_mut(2).unwrap().message_mut(2).unwrap().set_value(1, 9i32);
    assert!(n.push(3, GenericMessage::new(&s, "Node").unwrap()));

    for options in [EncodeOptions::default(), EncodeOptions { emit_defaults: true }] {
        let back = GenericMessage::decode(&s, "Node", &encode_with(&n, options)).unwrap();
        assert!(back.is_clean(), "{:?}", back.diagnostics);
        assert_eq!(back.value, n);
    }
    for keys in [JsonKeys::Number, JsonKeys::Name] {
        let back = from_json(&to_json(&n, JsonOptions::with_keys(keys)), &s, "Node").unwrap();
        assert!(back.is_clean(), "{:?}", back.diagnostics);
        assert_eq!(back.value, n);
    }
}
