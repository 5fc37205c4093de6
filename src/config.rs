//! # config: Follow configuration
//!
//! Operator-editable trading switches, persisted as a JSON file and re-read
//! at the start of every cycle.
//!
//! Loading never fails: a missing file yields defaults, an unparseable file
//! yields defaults, and every invalid field is replaced by its default with
//! a warning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::AppError;
use crate::store::write_atomic;

const DEFAULT_SCALE_RATIO: f64 = 0.1;
const DEFAULT_MAX_SINGLE_TRADE_AMOUNT: f64 = 1000.0;

// ─── FollowConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowConfig {
    /// Route detected changes to the exchange at all.
    pub enabled: bool,
    /// Multiplier in (0, 1] applied to every mirrored quantity.
    pub scale_ratio: f64,
    /// Models to mirror; empty mirrors all.
    pub whitelist_models: Vec<String>,
    /// Notional cap (USDT) for one position-increasing order.
    pub max_single_trade_amount: f64,
    pub dry_run: bool,
    pub notify_on_trade: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            enabled:                 false,
            scale_ratio:             DEFAULT_SCALE_RATIO,
            whitelist_models:        Vec::new(),
            max_single_trade_amount: DEFAULT_MAX_SINGLE_TRADE_AMOUNT,
            dry_run:                 false,
            notify_on_trade:         true,
        }
    }
}

impl FollowConfig {
    /// Validate a raw JSON document field by field.
    pub fn from_value(raw: &Value) -> Self {
        let mut cfg = Self::default();
        let Some(obj) = raw.as_object() else {
            warn!("⚠️ Config is not a JSON object, using defaults");
            return cfg;
        };

        if let Some(v) = obj.get("enabled") {
            cfg.enabled = bool_field("enabled", v, cfg.enabled);
        }
        if let Some(v) = obj.get("dry_run") {
            cfg.dry_run = bool_field("dry_run", v, cfg.dry_run);
        }
        if let Some(v) = obj.get("notify_on_trade").or_else(|| obj.get("notification_on_trade")) {
            cfg.notify_on_trade = bool_field("notify_on_trade", v, cfg.notify_on_trade);
        }

        if let Some(v) = obj.get("scale_ratio") {
            cfg.scale_ratio = match as_f64(v) {
                Some(r) if r > 0.0 && r <= 1.0 => r,
                _ => {
                    warn!(value = %v, default = DEFAULT_SCALE_RATIO, "⚠️ scale_ratio outside (0, 1], using default");
                    DEFAULT_SCALE_RATIO
                }
            };
        }

        if let Some(v) = obj.get("max_single_trade_amount") {
            cfg.max_single_trade_amount = match as_f64(v) {
                Some(a) if a > 0.0 && a.is_finite() => a,
                _ => {
                    warn!(value = %v, default = DEFAULT_MAX_SINGLE_TRADE_AMOUNT, "⚠️ max_single_trade_amount must be > 0, using default");
                    DEFAULT_MAX_SINGLE_TRADE_AMOUNT
                }
            };
        }

        if let Some(v) = obj.get("whitelist_models") {
            cfg.whitelist_models = match v.as_array() {
                Some(items) => items
                    .iter()
                    .filter_map(|m| match m {
                        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
                None => {
                    warn!(value = %v, "⚠️ whitelist_models must be a list, using empty list");
                    Vec::new()
                }
            };
        }

        cfg
    }

    /// Empty whitelist keeps everything.
    pub fn allows_model(&self, model_id: &str) -> bool {
        self.whitelist_models.is_empty() || self.whitelist_models.iter().any(|m| m == model_id)
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(key: &str, value: &Value, default: bool) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(default),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on"  => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                warn!(key, value = %s, "⚠️ Not a boolean, using default");
                default
            }
        },
        _ => {
            warn!(key, value = %value, "⚠️ Not a boolean, using default");
            default
        }
    }
}

// ─── ConfigStore ──────────────────────────────────────────────────────────────

/// File-backed store. Writes are serialized and atomic (temp file + rename).
pub struct ConfigStore {
    path:  PathBuf,
    write: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write: Mutex::new(()) }
    }

    /// Create the file with defaults when it does not exist yet.
    pub async fn ensure_exists(&self) -> Result<(), AppError> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        info!(path = %self.path.display(), "📝 Config file missing, writing defaults");
        self.save(&FollowConfig::default()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> FollowConfig {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(raw) => FollowConfig::from_value(&raw),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "⚠️ Config unparseable, using defaults");
                    FollowConfig::default()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "⚠️ Config unreadable, using defaults");
                FollowConfig::default()
            }
        }
    }

    pub async fn save(&self, config: &FollowConfig) -> Result<(), AppError> {
        let _guard = self.write.lock().await;
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| AppError::Storage(format!("config encode: {e}")))?;
        write_atomic(&self.path, text.as_bytes()).await
    }

    /// Merge `patch` over the current file, validate, persist.
    pub async fn update(&self, patch: &Value) -> Result<FollowConfig, AppError> {
        let Some(patch) = patch.as_object() else {
            return Err(AppError::BadRequest("config update must be a JSON object".into()));
        };

        let current = serde_json::to_value(self.load().await)
            .map_err(|e| AppError::Storage(format!("config encode: {e}")))?;
        let mut merged: Map<String, Value> = current.as_object().cloned().unwrap_or_default();
        for (key, value) in patch {
            let key = if key == "notification_on_trade" { "notify_on_trade" } else { key.as_str() };
            merged.insert(key.to_string(), value.clone());
        }

        let validated = FollowConfig::from_value(&Value::Object(merged));
        self.save(&validated).await?;
        info!(
            enabled     = validated.enabled,
            scale_ratio = validated.scale_ratio,
            dry_run     = validated.dry_run,
            whitelist   = ?validated.whitelist_models,
            "⚙️ Follow config updated"
        );
        Ok(validated)
    }
}
