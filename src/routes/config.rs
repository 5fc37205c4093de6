//! # routes::config
//!
//! | Method | Path          | Description                                  |
//! |--------|---------------|----------------------------------------------|
//! | GET    | `/api/config` | Current follow config (as the next cycle sees it) |
//! | POST   | `/api/config` | Partial update, validated like the file      |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::events::WsEvent;
use crate::state::SharedState;

pub async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    let config = state.config_store.load().await;
    Json(json!({
        "ok":     true,
        "path":   state.config_store.path().display().to_string(),
        "config": config,
    }))
}

/// Takes effect at the next cycle start.
pub async fn update_config(
    State(state): State<SharedState>,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.config_store.update(&patch).await?;
    state.broadcast(&WsEvent::ConfigUpdated { config: config.clone() });
    Ok(Json(json!({ "ok": true, "config": config })))
}
