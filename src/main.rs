// =============================================================================
// Options Desk — Main Entry Point
// =============================================================================
//
// Polls every configured ticker on a fixed interval, keeps the latest rows in
// memory, streams the first ticker's ATM call and underlying trades, and
// serves everything as JSON.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use options_desk::api;
use options_desk::app_state::AppState;
use options_desk::pipeline::Pipeline;
use options_desk::runtime_config::{Credentials, RuntimeConfig};
use options_desk::stream::{MessageBuffer, PolygonTransport, StreamManager, RECONNECT_DELAY_SECS};

const CONFIG_PATH: &str = "options_desk.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Options Desk starting up");

    let mut config = match RuntimeConfig::load(CONFIG_PATH) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "no usable config file, using defaults");
            RuntimeConfig::default()
        }
    };
    config.apply_env_overrides();

    let credentials = Credentials::from_env();
    info!(credentials = ?credentials, tickers = ?config.tickers, "configuration ready");

    // ── 2. Pipeline & live stream ────────────────────────────────────────
    let pipeline = Arc::new(Pipeline::from_config(&config, &credentials));

    let transport = Arc::new(PolygonTransport::new(
        config.endpoints.polygon_ws_url.clone(),
        credentials.polygon_api_key.clone(),
    ));
    let stream = Arc::new(StreamManager::new(
        transport,
        Arc::new(MessageBuffer::new(config.stream_buffer_capacity)),
        config.stream_join_timeout(),
        Duration::from_secs(RECONNECT_DELAY_SECS),
    ));

    let refresh_every = Duration::from_secs(config.refresh_interval_secs.max(1));
    let first_ticker = config.tickers.first().cloned();
    let state = Arc::new(AppState::new(config, pipeline, stream));

    // ── 3. Refresh loop ──────────────────────────────────────────────────
    let refresh_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_every);
        loop {
            interval.tick().await;
            let started = std::time::Instant::now();
            let rows = refresh_state.refresh().await;
            info!(
                rows,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "rows refreshed"
            );
        }
    });

    // ── 4. Live stream for the first ticker ──────────────────────────────
    match (&first_ticker, credentials.polygon_api_key.is_some()) {
        (Some(ticker), true) => {
            let stream_state = state.clone();
            let ticker = ticker.clone();
            tokio::spawn(async move {
                stream_state.subscribe(&ticker).await;
            });
        }
        (None, _) => warn!("no tickers configured; live stream not started"),
        (_, false) => warn!("POLYGON_API_KEY not set; live stream not started"),
    }

    // ── 5. API server ────────────────────────────────────────────────────
    let bind_addr =
        std::env::var("OPTIONS_DESK_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal; running until killed");
                std::future::pending::<()>().await;
            }
            warn!("Shutdown signal received, stopping gracefully");
            shutdown_state.unsubscribe().await;
        })
        .await?;

    info!("Options Desk shut down complete.");
    Ok(())
}
