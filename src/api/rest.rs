// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Reads return the latest immutable
// frame / status published by the session driver; the only write is the
// session switch, which is forwarded to the driver as a command.
//
// CORS is configured permissively; the viewer is expected to be served from
// a different origin during development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::binance::RateLimitSnapshot;
use crate::session::SessionCommand;
use crate::types::SessionKey;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/frame", get(frame))
        .route("/api/v1/status", get(status))
        .route("/api/v1/session", post(switch_session))
        // ── WebSocket (handled in the ws module but mounted here) ───────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_s: u64,
    ws_clients: u64,
    rate_limit: RateLimitSnapshot,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_s: state.start_time.elapsed().as_secs(),
        ws_clients: state
            .ws_clients
            .load(std::sync::atomic::Ordering::Relaxed),
        rate_limit: state.rate_limit(),
    };
    Json(resp)
}

// =============================================================================
// Frame / status
// =============================================================================

async fn frame(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.latest_frame() {
        Some(frame) => Json(frame).into_response(),
        None => {
            let body = serde_json::json!({ "frame": null, "message": "No frame rendered yet" });
            Json(body).into_response()
        }
    }
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot(false))
}

// =============================================================================
// Session switch
// =============================================================================

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    symbol: String,
    interval: String,
}

async fn switch_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SwitchRequest>,
) -> impl IntoResponse {
    let key = match SessionKey::new(&body.symbol, &body.interval) {
        Ok(key) => key,
        Err(e) => {
            warn!(symbol = %body.symbol, interval = %body.interval, error = %e, "rejected session switch");
            let resp = serde_json::json!({ "ok": false, "error": e.to_string() });
            return (StatusCode::BAD_REQUEST, Json(resp));
        }
    };

    if !state.send_command(SessionCommand::Switch(key.clone())).await {
        warn!(key = %key, "session driver is not running");
        let resp = serde_json::json!({ "ok": false, "error": "session driver is not running" });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(resp));
    }

    info!(key = %key, "session switch requested via API");
    let resp = serde_json::json!({ "ok": true, "key": key });
    (StatusCode::ACCEPTED, Json(resp))
}
