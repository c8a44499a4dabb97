use std::net::{Ipv4Addr, SocketAddr};

use serde::Deserialize;

use metawire_core::error::{MetaWireError, Result};
use metawire_core::json::JsonKeys;

/// Largest UDP payload over IPv4: 65535 - 20 (IP header) - 8 (UDP header).
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Container header plus a one-byte envelope.
const MIN_DATAGRAM_BYTES: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    pub schema: SchemaSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub ops: OpsSection,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetaWireError::UnsupportedVersion);
        }
        if self.schema.path.trim().is_empty() {
            return Err(MetaWireError::BadConfig("schema.path must not be empty".into()));
        }

        self.session.validate()?;
        self.ops.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    /// Message-definition file, relative to the working directory.
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// IPv4 multicast group to join on the bound socket.
    #[serde(default)]
    pub multicast_group: Option<String>,

    /// Destinations for published envelopes.
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub sender_stamp: u32,

    #[serde(default = "default_max_datagram_bytes")]
    pub max_datagram_bytes: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            multicast_group: None,
            targets: Vec::new(),
            sender_stamp: 0,
            max_datagram_bytes: default_max_datagram_bytes(),
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.multicast_addr()?;
        self.target_addrs()?;
        if !(MIN_DATAGRAM_BYTES..=MAX_UDP_PAYLOAD).contains(&self.max_datagram_bytes) {
            return Err(MetaWireError::BadConfig(format!(
                "session.max_datagram_bytes must be between \
                 {MIN_DATAGRAM_BYTES} and {MAX_UDP_PAYLOAD}"
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|_| {
            MetaWireError::BadConfig(format!("session.bind is not a socket address: {}", self.bind))
        })
    }

    pub fn multicast_addr(&self) -> Result<Option<Ipv4Addr>> {
        let Some(group) = &self.multicast_group else {
            return Ok(None);
        };
        let addr: Ipv4Addr = group.parse().map_err(|_| {
            MetaWireError::BadConfig(format!("session.multicast_group is not IPv4: {group}"))
        })?;
        if !addr.is_multicast() {
            return Err(MetaWireError::BadConfig(format!(
                "session.multicast_group {addr} is outside 224.0.0.0/4"
            )));
        }
        Ok(Some(addr))
    }

    pub fn target_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.targets
            .iter()
            .map(|t| {
                t.parse().map_err(|_| {
                    MetaWireError::BadConfig(format!(
                        "session.targets entry is not a socket address: {t}"
                    ))
                })
            })
            .collect()
    }
}

fn default_bind() -> String {
    "0.0.0.0:12175".into()
}
fn default_max_datagram_bytes() -> usize {
    MAX_UDP_PAYLOAD
}

/// What the relay does with each received envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One JSON line per envelope on stdout.
    #[default]
    Json,
    /// Re-framed containers written to stdout unchanged.
    Raw,
    /// Count and log only.
    None,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub keys: JsonKeys,

    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    /// Ops HTTP listener; absent disables the endpoints.
    #[serde(default = "default_ops_listen")]
    pub listen: Option<String>,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_ops_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.listen {
            None => Ok(None),
            Some(l) => l
                .parse()
                .map(Some)
                .map_err(|_| {
                    MetaWireError::BadConfig(format!("ops.listen is not a socket address: {l}"))
                }),
        }
    }
}

fn default_ops_listen() -> Option<String> {
    Some("127.0.0.1:9100".into())
}
