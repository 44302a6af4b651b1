// =============================================================================
// kline-watch — Main Entry Point
// =============================================================================
//
// Starts one viewing session for the configured pair and serves it over
// HTTP + WebSocket. The pair can be switched at runtime through the API; on
// shutdown the last viewed pair is recorded in the config file, if that file
// loaded at startup.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kline_watch::api;
use kline_watch::app_state::AppState;
use kline_watch::binance::{BinanceKlineFeed, BinanceRestClient};
use kline_watch::config::StreamConfig;
use kline_watch::session::{run_session, SessionCommand, SessionController};
use kline_watch::types::SessionKey;

const DEFAULT_CONFIG_PATH: &str = "kline_watch.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("kline-watch starting up");

    let config_path =
        std::env::var("KLINE_WATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let (mut config, loaded_from_disk) = match StreamConfig::load(&config_path) {
        Ok(config) => (config, true),
        Err(e) => {
            warn!(path = %config_path, error = %format!("{e:#}"), "failed to load config, using defaults");
            (StreamConfig::default(), false)
        }
    };
    config.apply_env_overrides();

    let initial_key = SessionKey::new(&config.symbol, &config.interval)
        .context("configured symbol / interval is not a valid session key")?;

    info!(
        key = %initial_key,
        capacity = config.capacity,
        sma_periods = ?config.sma_periods,
        rsi_period = config.rsi_period,
        "initial session configured"
    );

    // ── 2. Transports ────────────────────────────────────────────────────
    let rest = BinanceRestClient::new(&config.rest_base_url)?;
    let feed = BinanceKlineFeed::new(&config.ws_base_url);

    // ── 3. Shared view state + session driver ────────────────────────────
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(16);
    let state = Arc::new(AppState::new(cmd_tx.clone(), rest.rate_limit().clone()));

    let controller = SessionController::new(
        &config,
        Arc::new(rest),
        Arc::new(feed),
        state.clone(),
        state.clone(),
    );
    let driver = tokio::spawn(run_session(controller, cmd_rx));

    // ── 4. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Initial session ───────────────────────────────────────────────
    if cmd_tx.send(SessionCommand::Switch(initial_key)).await.is_err() {
        anyhow::bail!("session driver stopped before the initial session started");
    }

    info!("running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, closing live feed");

    let _ = cmd_tx.send(SessionCommand::Shutdown).await;
    let last_key = match driver.await {
        Ok(controller) => controller.key().cloned(),
        Err(e) => {
            error!(error = %e, "session driver task failed");
            None
        }
    };

    // Only a file that loaded cleanly is updated, and only its pair.
    if let (true, Some(key)) = (loaded_from_disk, last_key) {
        if let Err(e) = StreamConfig::remember_session(&config_path, &key) {
            error!(error = %format!("{e:#}"), "failed to record last session in config");
        }
    }

    info!("kline-watch shut down complete.");
    Ok(())
}
