//! UDP socket wrapper.
//!
//! Responsibilities:
//! - Bind, and join an IPv4 multicast group when configured
//! - Receive loop: one task per socket, handler runs inline per datagram
//! - Stop on shutdown signal

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use metawire_core::error::{MetaWireError, Result};

use super::{DatagramHandler, Transport};
use crate::config::SessionSection;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    max_datagram_bytes: usize,
}

impl UdpTransport {
    /// Bind per the session config.
    pub async fn bind(session: &SessionSection) -> Result<Self> {
        let addr = session.bind_addr()?;
        let socket = UdpSocket::bind(addr).await?;
        if let Some(group) = session.multicast_addr()? {
            socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
            socket.set_multicast_loop_v4(true)?;
            info!(%group, "joined multicast group");
        }
        Ok(Self::from_socket(socket, session.max_datagram_bytes))
    }

    pub fn from_socket(socket: UdpSocket, max_datagram_bytes: usize) -> Self {
        Self {
            socket: Arc::new(socket),
            max_datagram_bytes,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn max_datagram_bytes(&self) -> usize {
        self.max_datagram_bytes
    }

    /// Receive until `shutdown` flips to `true`, handing each datagram to `handler`.
    pub async fn run(
        &self,
        handler: Arc<dyn DatagramHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut buf = vec![0u8; self.max_datagram_bytes];
        info!(local = ?self.socket.local_addr().ok(), "receive loop started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                res = self.socket.recv_from(&mut buf) => {
                    match res {
                        Ok((n, source)) => {
                            debug!(%source, bytes = n, "datagram");
                            let data = Bytes::copy_from_slice(&buf[..n.min(buf.len())]);
                            handler.on_receive(data, source).await;
                        }
                        Err(e) => warn!(error = %e, "recv_from failed"),
                    }
                }
            }
        }
        info!("receive loop stopped");
        Ok(())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, bytes: Bytes, dest: SocketAddr) -> Result<()> {
        if bytes.len() > self.max_datagram_bytes {
            return Err(MetaWireError::PayloadTooLarge(format!(
                "datagram of {} bytes exceeds {}",
                bytes.len(),
                self.max_datagram_bytes
            )));
        }
        let sent = self.socket.send_to(&bytes, dest).await?;
        if sent != bytes.len() {
            let text = format!("short send: {sent} of {} bytes", bytes.len());
            return Err(MetaWireError::Internal(text));
        }
        Ok(())
    }
}
