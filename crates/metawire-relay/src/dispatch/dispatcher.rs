use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use metawire_core::envelope::Envelope;
use metawire_core::error::{MetaWireError, Result};

/// Per-envelope context handed to handlers.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCtx {
    pub source: SocketAddr,
    /// The container as received (header included) is this long.
    pub container_len: usize,
}

/// Consumer of received envelopes.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, ctx: EnvelopeCtx, env: Envelope) -> Result<()>;
}

/// Which route an envelope took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler registered for its data type.
    Routed,
    /// No specific handler; the fallback took it.
    Fallback,
}

/// Routes envelopes by `data_type`, with an optional catch-all.
#[derive(Default)]
pub struct Dispatcher {
    by_type: DashMap<i32, Arc<dyn EnvelopeHandler>>,
    fallback: Option<Arc<dyn EnvelopeHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, data_type: i32, handler: Arc<dyn EnvelopeHandler>) {
        self.by_type.insert(data_type, handler);
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn EnvelopeHandler>) {
        self.fallback = Some(handler);
    }

    pub fn registered_types(&self) -> Vec<i32> {
        let mut types: Vec<i32> = self.by_type.iter().map(|e| *e.key()).collect();
        types.sort_unstable();
        types
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub async fn dispatch(&self, ctx: EnvelopeCtx, env: Envelope) -> Result<DispatchOutcome> {
        let data_type = env.data_type;
        // clone out of the map so no shard lock is held across the await
        let routed = self.by_type.get(&data_type).map(|e| e.value().clone());
        let (handler, outcome) = match (routed, &self.fallback) {
            (Some(h), _) => (h, DispatchOutcome::Routed),
            (None, Some(f)) => (Arc::clone(f), DispatchOutcome::Fallback),
            (None, None) => {
                let text = format!("no handler for data type {data_type}");
                return Err(MetaWireError::UnknownMessage(text));
            }
        };
        handler.handle(ctx, env).await?;
        Ok(outcome)
    }
}
