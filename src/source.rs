//! # source: Snapshot sources
//!
//! Where the followed positions come from. The orchestrator only sees the
//! [`SnapshotSource`] trait; [`Nof1Source`] is the production implementation.
//!
//! ## nof1 fetch
//! ```text
//! GET {api}/leaderboard                              → tracked model ids (cached)
//! GET {api}/account-totals?lastHourlyMarker=N        → newest hourly records
//! GET {api}/account-totals?lastHourlyMarker=N-1      → only if models are missing
//! ```
//! `N` counts whole hours since 2025-10-18 06:00 local time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::Snapshot;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// One fresh snapshot. Errors abort the cycle without touching state.
    async fn fetch(&self) -> Result<Snapshot, AppError>;
}

// ─── Hourly Marker ────────────────────────────────────────────────────────────

fn marker_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, 18)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .unwrap_or_default()
}

/// Whole hours between the marker epoch and `now` (local wall clock).
pub fn hourly_marker(now: NaiveDateTime) -> i64 {
    (now - marker_epoch()).num_seconds().div_euclid(3600)
}

fn entry_model(entry: &Value) -> Option<&str> {
    entry
        .get("model_id")
        .or_else(|| entry.get("id"))
        .and_then(Value::as_str)
}

/// Keep tracked models only; fill missing ones from the older batch.
pub fn merge_account_totals(primary: Vec<Value>, fallback: Vec<Value>, tracked: &[String]) -> Vec<Value> {
    let is_tracked = |e: &Value| entry_model(e).is_some_and(|m| tracked.iter().any(|t| t == m));

    let mut merged: Vec<Value> = primary.into_iter().filter(|e| is_tracked(e)).collect();
    for entry in fallback.into_iter().filter(|e| is_tracked(e)) {
        let model = entry_model(&entry).map(str::to_string);
        let already = merged.iter().any(|e| entry_model(e).map(str::to_string) == model);
        if !already {
            merged.push(entry);
        }
    }
    merged
}

fn missing_models(entries: &[Value], tracked: &[String]) -> usize {
    tracked
        .iter()
        .filter(|t| !entries.iter().any(|e| entry_model(e) == Some(t.as_str())))
        .count()
}

// ─── Nof1Source ───────────────────────────────────────────────────────────────

pub struct Nof1Source {
    client:      reqwest::Client,
    api_url:     String,
    leaderboard: RwLock<Vec<String>>,
}

impl Nof1Source {
    /// `api_url` is the API root; a trailing `/account-totals` is stripped.
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        let api_url = api_url
            .trim_end_matches('/')
            .trim_end_matches("/account-totals")
            .to_string();
        Self { client, api_url, leaderboard: RwLock::new(Vec::new()) }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get_json(&self, url: &str) -> Result<Value, AppError> {
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::FetchFailure(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::FetchFailure(format!("GET {url}: HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::FetchFailure(format!("GET {url}: invalid JSON: {e}")))
    }

    /// Tracked model ids; fetched when the cache is empty.
    async fn tracked_models(&self) -> Result<Vec<String>, AppError> {
        {
            let cached = self.leaderboard.read().await;
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let doc = self.get_json(&format!("{}/leaderboard", self.api_url)).await?;
        let models: Vec<String> = doc
            .get("leaderboard")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if models.is_empty() {
            return Err(AppError::FetchFailure("leaderboard is empty".into()));
        }
        info!(models = ?models, "📋 Leaderboard loaded");
        *self.leaderboard.write().await = models.clone();
        Ok(models)
    }

    async fn account_totals(&self, marker: i64) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/account-totals?lastHourlyMarker={marker}", self.api_url);
        debug!(url = %url, "Fetching account totals");
        let doc = self.get_json(&url).await?;
        Ok(doc
            .get("accountTotals")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotSource for Nof1Source {
    async fn fetch(&self) -> Result<Snapshot, AppError> {
        let tracked = self.tracked_models().await?;
        let marker = hourly_marker(Local::now().naive_local());

        let primary = self.account_totals(marker).await?;
        let mut entries = merge_account_totals(primary, Vec::new(), &tracked);

        let missing = missing_models(&entries, &tracked);
        if missing > 0 {
            info!(missing, marker = marker - 1, "Hourly data incomplete, filling from previous hour");
            match self.account_totals(marker - 1).await {
                Ok(older) => entries = merge_account_totals(entries, older, &tracked),
                Err(e) => warn!(error = %e, "⚠️ Previous hour unavailable, continuing with partial data"),
            }
        }

        if entries.is_empty() {
            return Err(AppError::FetchFailure("account totals returned no tracked models".into()));
        }

        let snapshot = Snapshot::from_account_totals(&entries, Utc::now());
        info!(
            models    = snapshot.models.len(),
            positions = snapshot.position_count(),
            "📥 Positions fetched"
        );
        Ok(snapshot)
    }
}
