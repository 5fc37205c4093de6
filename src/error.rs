//! # error
//!
//! Centralised application error type.
//!
//! Every handler and every orchestrator cycle returns `Result<_, AppError>`.
//! Axum's `IntoResponse` impl converts these into structured JSON error
//! bodies so API clients always get a machine-readable response even on
//! failure. Per-intent and per-environment trading failures never surface
//! here; they are `Outcome` values.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (e.g. a stored snapshot) does not exist yet.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Snapshot source unreachable or its document unparseable.
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    /// Reading or writing a persisted file failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg)   => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg)     => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::FetchFailure(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Storage(msg)      => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
