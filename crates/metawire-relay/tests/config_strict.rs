#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use metawire_core::json::JsonKeys;
use metawire_relay::config::{self, OutputFormat};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
schema: { path: "demo.odvd" }
session:
  bind: "0.0.0.0:12175"
  multicast_grup: "225.0.0.111" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
schema: { path: "demo.odvd" }
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.session.bind, "0.0.0.0:12175");
    assert_eq!(cfg.session.max_datagram_bytes, 65_507);
    assert!(cfg.session.targets.is_empty());
    assert_eq!(cfg.output.format, OutputFormat::Json);
    assert_eq!(cfg.output.keys, JsonKeys::Number);
    assert_eq!(cfg.ops.listen.as_deref(), Some("127.0.0.1:9100"));
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
schema: { path: "demo.odvd" }
session:
  bind: "0.0.0.0:12175"
  multicast_group: "225.0.0.111"
  targets: ["225.0.0.111:12175", "127.0.0.1:4000"]
  sender_stamp: 9
  max_datagram_bytes: 1400
output: { format: raw, keys: name, pretty: true }
ops: { listen: ~ }
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(
        cfg.session.multicast_addr().unwrap().map(|a| a.to_string()),
        Some("225.0.0.111".into())
    );
    assert_eq!(cfg.session.target_addrs().unwrap().len(), 2);
    assert_eq!(cfg.output.format, OutputFormat::Raw);
    assert_eq!(cfg.output.keys, JsonKeys::Name);
    assert!(cfg.ops.listen_addr().unwrap().is_none());
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\nschema: { path: a }\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn validation_rejects_bad_values() {
    let cases = [
        "version: 1\nschema: { path: \"\" }\n",
        "version: 1\nschema: { path: a }\nsession: { bind: \"nowhere\" }\n",
        "version: 1\nschema: { path: a }\nsession: { multicast_group: \"10.0.0.1\" }\n",
        "version: 1\nschema: { path: a }\nsession: { targets: [\"localhost\"] }\n",
        "version: 1\nschema: { path: a }\nsession: { max_datagram_bytes: 70000 }\n",
        "version: 1\nschema: { path: a }\nsession: { max_datagram_bytes: 2 }\n",
        "version: 1\nschema: { path: a }\nops: { listen: \"9100\" }\n",
        "version: 1\nschema: { path: a }\noutput: { format: xml }\n",
    ];
    for c in cases {
        let err = config::load_from_str(c).expect_err(c);
        assert_eq!(err.kind().as_str(), "BAD_CONFIG", "{c}");
    }
}

#[test]
fn missing_file_is_bad_config() {
    let err = config::load_from_file("/definitely/not/here.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_CONFIG");
}
