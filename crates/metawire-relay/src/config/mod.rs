//! Relay config loader (strict parsing).

pub mod schema;

use std::fs;

use metawire_core::error::{MetaWireError, Result};

pub use schema::{
    OpsSection, OutputFormat, OutputSection, RelayConfig, SchemaSection, SessionSection,
};

pub fn load_from_file(path: &str) -> Result<RelayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MetaWireError::BadConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RelayConfig> {
    let cfg: RelayConfig = serde_yaml::from_str(s)
        .map_err(|e| MetaWireError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
