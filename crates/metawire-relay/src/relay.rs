//! Relay pipeline.
//!
//! Inbound: datagram -> containers -> `Envelope` decode -> stamp `received`
//! -> dispatcher. Outbound: `GenericMessage` -> `Envelope` -> container ->
//! every configured target. Bad input is counted and logged, never fatal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use metawire_core::envelope::{Envelope, TimeStamp};
use metawire_core::error::{ErrorKind, Result};
use metawire_core::GenericMessage;

use crate::app_state::AppState;
use crate::dispatch::{DispatchOutcome, EnvelopeCtx};
use crate::transport::framing::{decode_containers, encode_container, CONTAINER_HEADER_LEN};
use crate::transport::{DatagramHandler, Transport};

pub struct Relay {
    state: AppState,
    transport: Arc<dyn Transport>,
}

impl Relay {
    pub fn new(state: AppState, transport: Arc<dyn Transport>) -> Self {
        Self { state, transport }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Wrap `message` with the configured sender stamp and send it to every
    /// target. Returns how many datagrams went out.
    pub async fn publish(&self, message: &GenericMessage) -> Result<usize> {
        let env = Envelope::wrap(message, self.state.cfg().session.sender_stamp);
        self.send_envelope(&env).await
    }

    pub async fn send_envelope(&self, env: &Envelope) -> Result<usize> {
        let framed = encode_container(&env.encode(), self.state.cfg().session.max_datagram_bytes)?;
        let metrics = self.state.metrics();
        let mut sent = 0;
        for &dest in self.state.targets() {
            self.transport.send(framed.clone(), dest).await?;
            metrics.datagrams_sent.inc(&[]);
            sent += 1;
        }
        debug!(data_type = env.data_type, bytes = framed.len(), sent, "envelope published");
        Ok(sent)
    }

    async fn process(&self, bytes: Bytes, source: SocketAddr) {
        let metrics = self.state.metrics();
        metrics.datagrams_received.inc(&[]);

        let containers = match decode_containers(bytes) {
            Ok(c) => c,
            Err(e) => {
                metrics.containers_rejected.inc(&[("reason", e.kind().as_str())]);
                debug!(%source, error = %e, "dropping datagram");
                return;
            }
        };

        for payload in containers {
            let started = Instant::now();
            let decoded = Envelope::decode(&payload);
            metrics.decode_duration.observe(&[], started.elapsed());

            if !decoded.is_clean() {
                for d in &decoded.diagnostics {
                    metrics.diagnostics.inc(&[("kind", d.kind.as_str())]);
                }
                let reason = decoded.diagnostics.first().map_or(ErrorKind::Internal, |d| d.kind);
                metrics.containers_rejected.inc(&[("reason", reason.as_str())]);
                debug!(%source, diagnostics = ?decoded.diagnostics, "dropping malformed envelope");
                continue;
            }

            let mut env = decoded.value;
            env.received = TimeStamp::now();
            let data_type = env.data_type;
            // label values must stay bounded: only schema ids are spelled out
            let known = self.state.schema().get_by_id(data_type).map(|m| m.id().to_string());
            if known.is_none() {
                metrics.unknown_data_types.inc(&[]);
            }

            let ctx = EnvelopeCtx {
                source,
                container_len: payload.len() + CONTAINER_HEADER_LEN,
            };
            match self.state.dispatcher().dispatch(ctx, env).await {
                Ok(DispatchOutcome::Routed) => {
                    metrics.envelopes_dispatched.inc(&[("route", "routed")])
                }
                Ok(DispatchOutcome::Fallback) => {
                    metrics.envelopes_dispatched.inc(&[("route", "fallback")])
                }
                Err(e) if e.kind() == ErrorKind::UnknownMessage => {
                    metrics.envelopes_dispatched.inc(&[("route", "dropped")]);
                    debug!(data_type, "no handler");
                }
                Err(e) => {
                    let label = known.as_deref().unwrap_or("unknown");
                    metrics.handler_errors.inc(&[("data_type", label)]);
                    warn!(data_type, %source, error = %e, "handler failed");
                }
            }
        }
    }
}

#[async_trait]
impl DatagramHandler for Relay {
    async fn on_receive(&self, bytes: Bytes, source: SocketAddr) {
        self.process(bytes, source).await;
    }
}
