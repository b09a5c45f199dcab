// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Rows are served from the last refresh;
// the screener runs on demand against the cached chain. Reading the stream
// messages drains the buffer, so each message is returned once.
//
// CORS is configured permissively; there is no authentication.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;
use crate::screener::ScreenedContract;
use crate::stream::StreamMessage;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/rows", get(rows))
        .route("/api/v1/rows/:ticker", get(row))
        .route("/api/v1/screener/:ticker", get(screener))
        .route("/api/v1/stream/messages", get(stream_messages))
        .route("/api/v1/stream/subscribe", post(stream_subscribe))
        .layer(cors)
        .with_state(state)
}

fn error_body(status: StatusCode, message: String) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message })))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    #[serde(flatten)]
    detail: crate::app_state::StatusSnapshot,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        detail: state.status(),
    })
}

// =============================================================================
// Rows
// =============================================================================

async fn rows(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.rows())
}

async fn row(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> impl IntoResponse {
    match state.row(&ticker) {
        Some(row) => Json(row).into_response(),
        None => error_body(
            StatusCode::NOT_FOUND,
            format!("no row for '{ticker}' yet"),
        )
        .into_response(),
    }
}

// =============================================================================
// Screener
// =============================================================================

#[derive(Serialize)]
struct ScreenerResponse {
    ticker: String,
    contracts: Vec<ScreenedContract>,
}

async fn screener(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> impl IntoResponse {
    let contracts = state.pipeline.screen(&ticker).await;
    Json(ScreenerResponse {
        ticker: ticker.trim().to_uppercase(),
        contracts,
    })
}

// =============================================================================
// Live stream
// =============================================================================

#[derive(Serialize)]
struct MessagesResponse {
    ticker: Option<String>,
    dropped_total: u64,
    messages: Vec<StreamMessage>,
}

async fn stream_messages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let target = state.stream.current_target().await;
    let buffer = state.stream.buffer();
    Json(MessagesResponse {
        ticker: target.map(|t| t.ticker),
        dropped_total: buffer.total_dropped(),
        messages: buffer.drain(),
    })
}

#[derive(Deserialize)]
struct SubscribeRequest {
    ticker: String,
}

async fn stream_subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> impl IntoResponse {
    let ticker = req.ticker.trim();
    if ticker.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "ticker must not be empty".into())
            .into_response();
    }

    let target = state.subscribe(ticker).await;
    info!(ticker = %target.ticker, "stream subscription changed via API");
    Json(target).into_response()
}
