//! signal-relay binary.
//! Loads `.env` and config, installs tracing + Prometheus, starts the periodic collector
//! and serves the HTTP API.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use signal_relay::ingest::scheduler::{spawn_collector, CollectorCfg};
use signal_relay::metrics::Metrics;
use signal_relay::{create_router, AppConfig, AppState, Relay};

/// `RELAY_LOG_FORMAT=json` switches to JSON lines; anything else is compact text.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signal_relay=info,warn"));

    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load().context("loading config")?;
    let addr = config.bind_addr()?;
    let interval_secs = config.server.collect_interval_secs;

    let metrics = Metrics::init()?;
    let relay = Arc::new(Relay::from_config(config)?);

    tracing::info!(
        upstreams = relay.fetchers.len(),
        min_score = relay.config.routing.min_score,
        "relay configured"
    );

    if interval_secs > 0 && !relay.fetchers.is_empty() {
        spawn_collector(
            CollectorCfg {
                interval: Duration::from_secs(interval_secs),
                start_since: None,
            },
            relay.fetchers.clone(),
            Arc::clone(&relay.pipeline),
        );
    } else {
        tracing::info!("background collector disabled");
    }

    let app = create_router(AppState {
        relay,
        metrics: Some(metrics.handle.clone()),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
