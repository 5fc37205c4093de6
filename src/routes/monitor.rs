//! # routes::monitor
//!
//! | Method    | Path             | Description                          |
//! |-----------|------------------|--------------------------------------|
//! | GET (WS)  | `/ws/monitor`    | Cycle events as JSON text frames     |
//! | GET       | `/api/positions` | Last stored snapshot                 |
//! | GET       | `/api/status`    | Last cycle report and counters       |
//! | GET       | `/health`        | Liveness, never authenticated        |

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::error::AppError;
use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Current status first ─────────────────────────────────────────────────
    let snapshot = {
        let report = state.last_report.read().await.clone();
        json!({
            "event":    "SNAPSHOT",
            "cycles":   state.cycle_count.load(Ordering::Relaxed),
            "failures": state.failure_count.load(Ordering::Relaxed),
            "trading":  state.trading,
            "report":   report,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ───────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST Endpoints ───────────────────────────────────────────────────────────

/// GET /api/positions: the snapshot the next cycle will diff against.
pub async fn get_positions(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .snapshot_store
        .load_previous()
        .await
        .ok_or_else(|| AppError::NotFound("no snapshot stored yet".into()))?;

    Ok(Json(json!({
        "ok":        true,
        "positions": snapshot.position_count(),
        "snapshot":  snapshot,
    })))
}

pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let report = state.last_report.read().await.clone();
    let last_error = state.last_error.read().await.clone();

    Json(json!({
        "ok":         true,
        "trading":    state.trading,
        "started_at": state.started_at,
        "cycles":     state.cycle_count.load(Ordering::Relaxed),
        "failures":   state.failure_count.load(Ordering::Relaxed),
        "last_error": last_error,
        "report":     report,
    }))
}

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "ok":          true,
        "uptime_secs": uptime,
        "cycles":      state.cycle_count.load(Ordering::Relaxed),
    }))
}
