//! # models::snapshot
//!
//! Point-in-time capture of every monitored model's positions.
//!
//! ```text
//! Snapshot
//!  └─ model_id → ModelPositions
//!                 ├─ realized_pnl
//!                 └─ symbol → PositionRecord
//! ```
//!
//! Maps are `BTreeMap` so iteration is lexicographic and detection output is
//! reproducible regardless of how the upstream document was ordered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::Direction;

// ─── ExitPlan ─────────────────────────────────────────────────────────────────

/// Targets the followed model attached to its position.
///
/// A target that is missing or a placeholder (`"N/A"`, empty, zero) is `None`,
/// never `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    #[serde(default, deserialize_with = "lenient_target")]
    pub profit_target: Option<f64>,
    #[serde(default, deserialize_with = "lenient_target")]
    pub stop_loss: Option<f64>,
}

/// Accepts numbers and numeric strings; anything else is "not set".
pub fn parse_target(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (raw.is_finite() && raw > 0.0).then_some(raw)
}

fn lenient_target<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_target(&value))
}

// ─── PositionRecord ───────────────────────────────────────────────────────────

/// One model's position on one symbol.
///
/// `quantity` is signed: positive = long, negative = short. The followed
/// account runs in one-way mode so there is at most one record per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub quantity: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub closed_pnl: f64,
    #[serde(default)]
    pub exit_plan: ExitPlan,

    // ── Bookkeeping (not used by detection) ──────────────────────────────────
    #[serde(default)]
    pub entry_time: Option<f64>,
    #[serde(default)]
    pub entry_oid: Option<i64>,
    #[serde(default)]
    pub tp_oid: Option<i64>,
    #[serde(default)]
    pub sl_oid: Option<i64>,
}

fn default_leverage() -> u32 {
    1
}

impl PositionRecord {
    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_quantity(self.quantity)
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Parse one upstream position object. Returns `None` for shapes the
    /// detector cannot classify (non-numeric quantity, non-object record).
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let quantity = number(obj.get("quantity")?)?;
        if !quantity.is_finite() {
            return None;
        }

        let leverage = match obj.get("leverage") {
            None | Some(Value::Null) => 1,
            Some(v) => {
                let raw = number(v)?;
                if !raw.is_finite() || raw < 1.0 {
                    return None;
                }
                raw.round() as u32
            }
        };

        let exit_plan = obj
            .get("exit_plan")
            .and_then(Value::as_object)
            .map(|plan| ExitPlan {
                profit_target: plan.get("profit_target").and_then(parse_target),
                stop_loss:     plan.get("stop_loss").and_then(parse_target),
            })
            .unwrap_or_default();

        let field = |key: &str| obj.get(key).and_then(number).unwrap_or(0.0);
        let oid = |key: &str| obj.get(key).and_then(Value::as_i64);

        Some(Self {
            quantity,
            leverage,
            entry_price:    field("entry_price"),
            current_price:  field("current_price"),
            margin:         field("margin"),
            unrealized_pnl: field("unrealized_pnl"),
            closed_pnl:     field("closed_pnl"),
            exit_plan,
            entry_time:     obj.get("entry_time").and_then(number),
            entry_oid:      oid("entry_oid"),
            tp_oid:         oid("tp_oid"),
            sl_oid:         oid("sl_oid"),
        })
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ─── ModelPositions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPositions {
    #[serde(default)]
    pub realized_pnl: f64,
    /// Upstream timestamp of this model's account record (seconds).
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub positions: BTreeMap<String, PositionRecord>,
}

impl ModelPositions {
    /// Live (non-flat) position for `symbol`, if any.
    pub fn position(&self, symbol: &str) -> Option<&PositionRecord> {
        self.positions.get(symbol).filter(|p| !p.is_flat())
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub models: BTreeMap<String, ModelPositions>,
}

impl Snapshot {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self { fetched_at, models: BTreeMap::new() }
    }

    pub fn model(&self, model_id: &str) -> Option<&ModelPositions> {
        self.models.get(model_id)
    }

    pub fn position_count(&self) -> usize {
        self.models.values().map(|m| m.positions.len()).sum()
    }

    /// Build from the upstream `accountTotals` array.
    ///
    /// Each entry needs a `model_id` (or `id`). When one model appears more
    /// than once, the entry with the newest `timestamp` wins. Records the
    /// detector cannot classify are dropped one symbol at a time.
    pub fn from_account_totals(entries: &[Value], fetched_at: DateTime<Utc>) -> Self {
        let mut snapshot = Self::new(fetched_at);

        for entry in entries {
            let Some(model_id) = entry
                .get("model_id")
                .or_else(|| entry.get("id"))
                .and_then(Value::as_str)
            else {
                warn!("Account entry without model_id, skipped");
                continue;
            };

            let timestamp = entry.get("timestamp").and_then(number).unwrap_or(0.0);
            if let Some(existing) = snapshot.models.get(model_id) {
                if existing.timestamp > timestamp {
                    debug!(model = model_id, "Older duplicate account entry ignored");
                    continue;
                }
            }

            let mut model = ModelPositions {
                realized_pnl: entry.get("realized_pnl").and_then(number).unwrap_or(0.0),
                timestamp,
                positions: BTreeMap::new(),
            };

            if let Some(positions) = entry.get("positions").and_then(Value::as_object) {
                for (symbol, raw) in positions {
                    match PositionRecord::from_value(raw) {
                        Some(record) => {
                            model.positions.insert(symbol.clone(), record);
                        }
                        None => warn!(
                            model = model_id,
                            symbol = %symbol,
                            "⚠️ Malformed position record, symbol skipped"
                        ),
                    }
                }
            }

            snapshot.models.insert(model_id.to_string(), model);
        }

        snapshot
    }
}
