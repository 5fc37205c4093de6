//! # engine::orchestrator
//!
//! **Follow Orchestrator**: sequences one full cycle.
//!
//! ```text
//! Idle → Fetch ─┬─ no previous ─────────────────────────► Persist → Idle
//!               └► Detect ─┬─ no intents ───────────────► Persist → Idle
//!                          └► Notify changes → Filter ─┬─ empty ─► Persist → Idle
//!                                                      └► Route → Notify report → Persist → Idle
//! ```
//!
//! Configuration is read once at cycle start and passed down. The previous
//! snapshot lives in memory and is mirrored to disk only for restarts.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, FollowConfig};
use crate::engine::detector;
use crate::engine::dispatcher::MultiEnvironmentDispatcher;
use crate::engine::router::ExecutionMode;
use crate::error::AppError;
use crate::models::{DispatchReport, Snapshot, TradeIntent};
use crate::notify::NotificationHub;
use crate::report;
use crate::source::SnapshotSource;
use crate::store::SnapshotStore;

// ─── Cycle Report ─────────────────────────────────────────────────────────────

/// Where a cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStage {
    /// First snapshot, nothing to diff against.
    Baseline,
    NoChanges,
    /// Every intent belonged to a model outside the whitelist.
    FilteredOut,
    /// Following disabled or no exchange configured.
    NotRouted,
    Routed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at:  DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stage:       CycleStage,
    pub models:      usize,
    pub positions:   usize,
    pub detected:    usize,
    /// Intents left after the whitelist.
    pub eligible:    usize,
    pub dry_run:     bool,
    pub intents:     Vec<TradeIntent>,
    pub dispatch:    Option<DispatchReport>,
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

pub struct FollowOrchestrator {
    source:     Arc<dyn SnapshotSource>,
    store:      Arc<SnapshotStore>,
    config:     Arc<ConfigStore>,
    dispatcher: Option<MultiEnvironmentDispatcher>,
    notifier:   NotificationHub,
    /// Detection allow-list; empty = all models.
    monitored:  HashSet<String>,
    previous:   Option<Snapshot>,
    restored:   bool,
}

impl FollowOrchestrator {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<SnapshotStore>,
        config: Arc<ConfigStore>,
        notifier: NotificationHub,
    ) -> Self {
        Self {
            source,
            store,
            config,
            dispatcher: None,
            notifier,
            monitored:  HashSet::new(),
            previous:   None,
            restored:   false,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: MultiEnvironmentDispatcher) -> Self {
        self.dispatcher = Some(dispatcher).filter(|d| !d.is_empty());
        self
    }

    pub fn with_monitored_models(mut self, models: impl IntoIterator<Item = String>) -> Self {
        self.monitored = models.into_iter().collect();
        self
    }

    pub fn notifier(&self) -> &NotificationHub {
        &self.notifier
    }

    /// One full cycle. Only a fetch failure is an error; the previous
    /// snapshot is then left untouched and the next tick retries.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, AppError> {
        let started_at = Utc::now();

        // ── 1. Config, captured once ─────────────────────────────────────────
        let config = self.config.load().await;

        // ── 2. Fetch ─────────────────────────────────────────────────────────
        let current = self.source.fetch().await?;
        if let Err(e) = self.store.archive(&current).await {
            warn!(error = %e, "⚠️ History archive failed");
        }

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            stage:       CycleStage::Baseline,
            models:      current.models.len(),
            positions:   current.position_count(),
            detected:    0,
            eligible:    0,
            dry_run:     config.dry_run,
            intents:     Vec::new(),
            dispatch:    None,
        };

        if !self.restored {
            self.previous = self.store.load_previous().await;
            self.restored = true;
        }

        // ── 3. Detect ────────────────────────────────────────────────────────
        let Some(previous) = self.previous.as_ref() else {
            info!(models = report.models, "📌 First snapshot stored as baseline");
            return Ok(self.finish(current, report).await);
        };

        let allowed = (!self.monitored.is_empty()).then_some(&self.monitored);
        let intents = detector::detect(previous, &current, allowed);
        report.detected = intents.len();

        if intents.is_empty() {
            debug!("No position changes");
            report.stage = CycleStage::NoChanges;
            return Ok(self.finish(current, report).await);
        }

        for intent in &intents {
            info!(model = %intent.model_id, "🔔 {}", intent.summary);
        }
        self.notifier
            .broadcast(&report::change_summary(&intents, Utc::now()))
            .await;

        // ── 4. Filter ────────────────────────────────────────────────────────
        let eligible: Vec<TradeIntent> = intents
            .iter()
            .filter(|i| {
                let keep = config.allows_model(&i.model_id);
                if !keep {
                    debug!(model = %i.model_id, "⏭️ Not whitelisted, skipped");
                }
                keep
            })
            .cloned()
            .collect();
        report.eligible = eligible.len();
        report.intents = intents;

        if eligible.is_empty() {
            info!(whitelist = ?config.whitelist_models, "No whitelisted changes to follow");
            report.stage = CycleStage::FilteredOut;
            return Ok(self.finish(current, report).await);
        }

        // ── 5. Route ─────────────────────────────────────────────────────────
        let Some(dispatcher) = self.dispatcher.as_ref().filter(|_| config.enabled) else {
            info!(
                enabled  = config.enabled,
                exchange = self.dispatcher.is_some(),
                "Following inactive, changes not routed"
            );
            report.stage = CycleStage::NotRouted;
            return Ok(self.finish(current, report).await);
        };

        let mode = ExecutionMode::from_config(&config);
        info!(
            intents     = eligible.len(),
            scale_ratio = config.scale_ratio,
            dry_run     = config.dry_run,
            "🚀 Routing changes"
        );
        let dispatch = dispatcher.execute(&eligible, &config, mode).await;

        // ── 6. Notify ────────────────────────────────────────────────────────
        if config.notify_on_trade {
            self.notify_results(&dispatch, &config, mode).await;
        }

        report.stage = CycleStage::Routed;
        report.dispatch = Some(dispatch);
        Ok(self.finish(current, report).await)
    }

    async fn notify_results(&self, dispatch: &DispatchReport, config: &FollowConfig, mode: ExecutionMode) {
        for result in dispatch.results() {
            let text = report::execution_report(result, config, mode, Utc::now());
            self.notifier.broadcast(&text).await;
        }
    }

    /// ── 7. Persist ── the fetched snapshot becomes "previous".
    async fn finish(&mut self, current: Snapshot, mut report: CycleReport) -> CycleReport {
        if let Err(e) = self.store.save(&current).await {
            error!(error = %e, "❌ Snapshot not persisted, kept in memory only");
        }
        self.previous = Some(current);

        report.finished_at = Utc::now();
        info!(
            stage    = ?report.stage,
            detected = report.detected,
            eligible = report.eligible,
            "✅ Cycle complete"
        );
        report
    }
}
