//! # auth: API Key Middleware
//!
//! Guards the HTTP API with an `X-API-Key` header.
//!
//! - `API_KEY` unset or empty → every request passes (local use)
//! - `API_KEY` set → every request must carry `X-API-Key: <key>`
//!
//! `/health` is always open.
//!
//! ```bash
//! curl -H "X-API-Key: $API_KEY" http://localhost:5010/api/status
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

pub async fn require_api_key(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if state.api_key.is_empty() {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if path == "/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == state.api_key {
        next.run(request).await
    } else {
        warn!(path, "❌ Unauthorized request, invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
                "hint":  "Set X-API-Key header with your API key"
            })),
        )
            .into_response()
    }
}
