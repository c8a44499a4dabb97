//! metawire relay
//!
//! Usage:
//! - `metawire-relay [config.yaml]` : receive envelopes and dump them per `output`
//! - `metawire-relay <config.yaml> send <Message> '<json>'` : publish one message to
//!   `session.targets`
//!
//! Ops endpoints (`/healthz`, `/readyz`, `/metrics`) listen on `ops.listen`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use metawire_core::error::{MetaWireError, Result};
use metawire_core::json::from_json;
use metawire_relay::{app_state::AppState, config, relay::Relay, router, transport::UdpTransport};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        error!(code = e.kind().as_str(), "{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "metawire.yaml".to_string());

    let cfg = config::load_from_file(&path)?;
    let state = AppState::new(cfg)?;
    let transport = Arc::new(UdpTransport::bind(&state.cfg().session).await?);
    let relay = Arc::new(Relay::new(state.clone(), transport.clone()));

    match args.next().as_deref() {
        None => {}
        Some("send") => {
            let name = args
                .next()
                .ok_or_else(|| MetaWireError::BadConfig("send needs a message name".into()))?;
            let text = args.next().unwrap_or_else(|| "{}".to_string());
            let decoded = from_json(&text, state.schema(), &name)?;
            for d in &decoded.diagnostics {
                error!(code = d.kind.as_str(), "{d}");
            }
            let msg = decoded.into_result()?;
            let sent = relay.publish(&msg).await?;
            info!(message = %name, sent, "published");
            return Ok(());
        }
        Some(other) => return Err(MetaWireError::BadConfig(format!("unknown command: {other}"))),
    }

    if let Some(listen) = state.cfg().ops.listen_addr()? {
        let app = router::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind(listen).await?;
        info!(%listen, "ops endpoints listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "ops server failed");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let receiver = {
        let transport = Arc::clone(&transport);
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { transport.run(relay, shutdown_rx).await })
    };

    info!(local = %transport.local_addr()?, "metawire-relay running");
    tokio::signal::ctrl_c().await?;

    info!("shutdown requested");
    state.metrics().set_draining();
    let _ = shutdown_tx.send(true);
    receiver
        .await
        .map_err(|e| MetaWireError::Internal(format!("receive task failed: {e}")))?
}
