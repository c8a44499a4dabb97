//! Binary wire vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;
use std::sync::Arc;

use metawire_core::json::{to_json_value, JsonKeys, JsonOptions};
use metawire_core::{encode, parse, GenericMessage};

mod vector_loader;
use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn wire_vectors() {
    let files = [
        "point.json",
        "signed_zigzag.json",
        "unknown_field.json",
        "packed_repeats.json",
        "unpacked_repeats.json",
        "nested_message.json",
        "truncated_fixed64.json",
        "bad_wire_type.json",
        "length_past_end.json",
    ];

    for f in files {
        let v = load(f);
        let parsed = parse(&v.schema);
        assert!(parsed.is_clean(), "vector={} schema: {:?}", v.description, parsed.diagnostics);
        let schema = Arc::new(parsed.value);

        let raw = v.frame.decode();
        let decoded = GenericMessage::decode(&schema, &v.message, &raw).unwrap();

        if let Some(err) = v.expect_error {
            let first = decoded.diagnostics.first().expect("expected a diagnostic");
            assert_eq!(first.kind.as_str(), err.code, "vector={}", v.description);
            continue;
        }

        assert!(decoded.is_clean(), "vector={} {:?}", v.description, decoded.diagnostics);
        let ex = v.expect.expect("missing expect block");
        let json = to_json_value(&decoded.value, JsonOptions::with_keys(JsonKeys::Name));
        assert_eq!(json, ex, "vector={}", v.description);

        if v.canonical {
            assert_eq!(encode(&decoded.value).to_vec(), raw, "vector={}", v.description);
        }
    }
}
