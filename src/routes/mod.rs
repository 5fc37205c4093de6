pub mod config;
pub mod monitor;

use axum::{
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

use config::{get_config, update_config};
use monitor::{get_positions, get_status, health_check, ws_monitor};

/// Full HTTP surface with auth, tracing and CORS layers.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health",         get(health_check))
        .route("/api/config",     get(get_config).post(update_config))
        .route("/api/positions",  get(get_positions))
        .route("/api/status",     get(get_status))
        .route("/ws/monitor",     get(ws_monitor))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
