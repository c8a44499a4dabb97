//! JSON test vector loader shared by the wire tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    /// Message-definition text the frame is decoded against.
    pub schema: String,
    /// Message type name.
    pub message: String,
    pub frame: FrameData,
    /// Re-encoding the decoded message reproduces `frame` exactly.
    #[serde(default)]
    pub canonical: bool,
    /// Expected JSON rendering, keyed by field name.
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    pub fn decode(&self) -> Vec<u8> {
        match self.encoding.as_str() {
            "base64" => base64::engine::general_purpose::STANDARD
                .decode(&self.data)
                .expect("invalid base64 in test vector"),
            "hex" => hex::decode(&self.data).expect("invalid hex in test vector"),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}
