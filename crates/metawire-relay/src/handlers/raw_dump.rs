use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use metawire_core::envelope::Envelope;
use metawire_core::error::Result;

use super::Output;
use crate::dispatch::{EnvelopeCtx, EnvelopeHandler};
use crate::transport::framing::{encode_container, CONTAINER_HEADER_LEN, MAX_CONTAINER_PAYLOAD};

/// Writes each envelope back out as a framed container, for piping into
/// other tools.
pub struct RawDumpHandler {
    out: Mutex<Output>,
}

impl RawDumpHandler {
    pub fn new(out: Output) -> Self {
        Self { out: Mutex::new(out) }
    }
}

#[async_trait]
impl EnvelopeHandler for RawDumpHandler {
    fn name(&self) -> &'static str {
        "raw_dump"
    }

    async fn handle(&self, _ctx: EnvelopeCtx, env: Envelope) -> Result<()> {
        let framed = encode_container(&env.encode(), MAX_CONTAINER_PAYLOAD + CONTAINER_HEADER_LEN)?;
        let mut out = self.out.lock().await;
        out.write_all(&framed).await?;
        out.flush().await?;
        Ok(())
    }
}
