use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use metawire_core::envelope::{envelope_to_json, Envelope};
use metawire_core::error::Result;
use metawire_core::json::JsonOptions;
use metawire_core::Schema;

use super::Output;
use crate::dispatch::{EnvelopeCtx, EnvelopeHandler};
use crate::obs::metrics::RelayMetrics;

/// Writes one JSON document per envelope, payload decoded through the schema.
pub struct JsonDumpHandler {
    schema: Arc<Schema>,
    options: JsonOptions,
    metrics: Arc<RelayMetrics>,
    out: Mutex<Output>,
}

impl JsonDumpHandler {
    pub fn new(
        schema: Arc<Schema>,
        options: JsonOptions,
        metrics: Arc<RelayMetrics>,
        out: Output,
    ) -> Self {
        Self {
            schema,
            options,
            metrics,
            out: Mutex::new(out),
        }
    }

    /// Render the line written for `env` (no trailing newline).
    pub fn render(&self, ctx: &EnvelopeCtx, env: &Envelope) -> String {
        let decoded = envelope_to_json(env, &self.schema, self.options);
        for d in &decoded.diagnostics {
            self.metrics.diagnostics.inc(&[("kind", d.kind.as_str())]);
            warn!(data_type = env.data_type, source = %ctx.source, "payload: {d}");
        }
        let doc = json!({
            "source": ctx.source.to_string(),
            "envelope": decoded.value,
        });
        let text = if self.options.pretty {
            serde_json::to_string_pretty(&doc)
        } else {
            serde_json::to_string(&doc)
        };
        text.unwrap_or_default()
    }
}

#[async_trait]
impl EnvelopeHandler for JsonDumpHandler {
    fn name(&self) -> &'static str {
        "json_dump"
    }

    async fn handle(&self, ctx: EnvelopeCtx, env: Envelope) -> Result<()> {
        let mut line = self.render(&ctx, &env);
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
