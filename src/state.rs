//! # state
//!
//! [`AppState`]: what the HTTP API and the cycle loop share. The loop owns
//! the orchestrator; it only writes its results here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::config::ConfigStore;
use crate::engine::CycleReport;
use crate::error::AppError;
use crate::events::WsEvent;
use crate::store::SnapshotStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    // ── Persistence ──────────────────────────────────────────────────────────
    pub config_store:   Arc<ConfigStore>,
    pub snapshot_store: Arc<SnapshotStore>,

    // ── Cycle status ─────────────────────────────────────────────────────────
    pub last_report:    RwLock<Option<CycleReport>>,
    pub last_error:     RwLock<Option<String>>,
    pub cycle_count:    AtomicU64,
    pub failure_count:  AtomicU64,

    // ── Monitor / WebSocket ──────────────────────────────────────────────────
    /// Pre-serialized [`WsEvent`] JSON.
    pub broadcast_tx:   broadcast::Sender<String>,

    // ── Static info ──────────────────────────────────────────────────────────
    /// `X-API-Key` expected by the API; empty = open.
    pub api_key:        String,
    pub trading:        String,
    pub started_at:     DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config_store: Arc<ConfigStore>,
        snapshot_store: Arc<SnapshotStore>,
        api_key: impl Into<String>,
        trading: impl Into<String>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config_store,
            snapshot_store,
            last_report:   RwLock::new(None),
            last_error:    RwLock::new(None),
            cycle_count:   AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            broadcast_tx,
            api_key:       api_key.into(),
            trading:       trading.into(),
            started_at:    Utc::now(),
        }
    }

    /// No listeners is fine (headless runs).
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    /// Store the outcome of one cycle and push it to monitors.
    pub async fn record_cycle(&self, outcome: &Result<CycleReport, AppError>) {
        let cycle = self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;
        match outcome {
            Ok(report) => {
                *self.last_report.write().await = Some(report.clone());
                *self.last_error.write().await = None;
                self.broadcast(&WsEvent::CycleCompleted { cycle, report: Box::new(report.clone()) });
            }
            Err(e) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                *self.last_error.write().await = Some(e.to_string());
                self.broadcast(&WsEvent::CycleFailed { cycle, at: Utc::now(), error: e.to_string() });
            }
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(
    config_store: Arc<ConfigStore>,
    snapshot_store: Arc<SnapshotStore>,
    api_key: impl Into<String>,
    trading: impl Into<String>,
) -> SharedState {
    Arc::new(AppState::new(config_store, snapshot_store, api_key, trading))
}
