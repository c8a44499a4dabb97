//! Shared application state for the relay.
//!
//! Loads and compiles the schema, builds the metrics registry and the
//! dispatcher, and registers the output handler the config asks for.
//! Startup errors are returned, never panicked.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use metawire_core::error::{MetaWireError, Result};
use metawire_core::json::JsonOptions;
use metawire_core::{parse, Schema};

use crate::config::{OutputFormat, RelayConfig};
use crate::dispatch::Dispatcher;
use crate::handlers::{self, JsonDumpHandler, Output, RawDumpHandler};
use crate::obs::metrics::RelayMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<RelayMetrics>,
}

struct AppStateInner {
    cfg: RelayConfig,
    schema: Arc<Schema>,
    targets: Vec<SocketAddr>,
}

impl AppState {
    /// Read the schema file named by the config and write output to stdout.
    pub fn new(cfg: RelayConfig) -> Result<Self> {
        let text = fs::read_to_string(&cfg.schema.path).map_err(|e| {
            MetaWireError::BadConfig(format!("read schema {} failed: {e}", cfg.schema.path))
        })?;
        let schema = compile_schema(&text)?;
        Self::with_output(cfg, schema, handlers::stdout())
    }

    /// Build state around an already compiled schema and an output sink.
    pub fn with_output(cfg: RelayConfig, schema: Arc<Schema>, out: Output) -> Result<Self> {
        let targets = cfg.session.target_addrs()?;
        let metrics = Arc::new(RelayMetrics::default());

        let mut dispatcher = Dispatcher::new();
        match cfg.output.format {
            OutputFormat::Json => {
                let options = JsonOptions {
                    keys: cfg.output.keys,
                    pretty: cfg.output.pretty,
                };
                dispatcher.set_fallback(Arc::new(JsonDumpHandler::new(
                    Arc::clone(&schema),
                    options,
                    Arc::clone(&metrics),
                    out,
                )));
            }
            OutputFormat::Raw => dispatcher.set_fallback(Arc::new(RawDumpHandler::new(out))),
            OutputFormat::None => {}
        }

        info!(
            messages = schema.len(),
            output = ?cfg.output.format,
            targets = targets.len(),
            "relay state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, schema, targets }),
            dispatcher: Arc::new(dispatcher),
            metrics,
        })
    }

    pub fn cfg(&self) -> &RelayConfig {
        &self.inner.cfg
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.inner.targets
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Gauges computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("metawire_schema_messages", self.inner.schema.len() as u64),
            ("metawire_routes_registered", self.dispatcher.registered_types().len() as u64),
        ]
    }
}

/// Compile definition text for the relay. Diagnostics are logged; a schema
/// without any message is an error.
pub fn compile_schema(text: &str) -> Result<Arc<Schema>> {
    let out = parse(text);
    for d in &out.diagnostics {
        warn!(code = d.kind.as_str(), "schema: {d}");
    }
    if out.value.is_empty() {
        return Err(MetaWireError::BadConfig("schema defines no messages".into()));
    }
    Ok(Arc::new(out.value))
}
