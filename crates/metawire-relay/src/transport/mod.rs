//! Transport layer (UDP datagrams).
//!
//! Exposes the container framing shared by sender and receiver plus the
//! UDP socket wrapper that feeds received datagrams to a handler.

pub mod framing;
pub mod udp;

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use metawire_core::error::Result;

pub use udp::UdpTransport;

/// Outbound side: deliver one datagram. No ordering or delivery guarantee.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, bytes: Bytes, dest: SocketAddr) -> Result<()>;
}

/// Inbound side: called once per received datagram.
#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn on_receive(&self, bytes: Bytes, source: SocketAddr);
}
