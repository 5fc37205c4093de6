//! # events
//!
//! [`WsEvent`]: everything pushed to `/ws/monitor` clients.
//!
//! Events are serialized once and sent over a `broadcast::Sender<String>`,
//! so every subscriber gets the same pre-rendered JSON text frame.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::FollowConfig;
use crate::engine::CycleReport;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// A cycle finished (any stage).
    CycleCompleted {
        cycle:  u64,
        report: Box<CycleReport>,
    },

    /// The snapshot fetch failed; previous state is unchanged.
    CycleFailed {
        cycle: u64,
        at:    DateTime<Utc>,
        error: String,
    },

    /// Follow config changed through the HTTP API.
    ConfigUpdated {
        config: FollowConfig,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
