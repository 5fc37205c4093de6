//! # engine::risk: Risk Policy
//!
//! Pure rule set consulted by the router before anything is sent.
//!
//! ## Layers
//! 1. **Minimum size**   : scaled quantities below the tradable minimum are no-ops
//! 2. **Protection gate**: an Open must carry both take-profit and stop-loss
//! 3. **Notional cap**   : Open/Add above `max_single_trade_amount` are blocked

use crate::config::FollowConfig;
use crate::models::{Action, PositionChange};

/// Smallest quantity the router will submit.
pub const MIN_TRADABLE_QTY: f64 = 1e-4;

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Blocked(String),
}

/// Both protective targets of an Open, validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Protection {
    pub stop_loss:   f64,
    pub take_profit: f64,
}

// ─── Policy ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RiskPolicy {
    pub min_qty: f64,
    pub max_single_trade_amount: f64,
}

impl RiskPolicy {
    pub fn from_config(config: &FollowConfig) -> Self {
        Self {
            min_qty: MIN_TRADABLE_QTY,
            max_single_trade_amount: config.max_single_trade_amount,
        }
    }

    pub fn scale(quantity_delta: f64, scale_ratio: f64) -> f64 {
        quantity_delta.abs() * scale_ratio
    }

    pub fn is_tradable(&self, scaled_qty: f64) -> bool {
        scaled_qty > 0.0 && scaled_qty >= self.min_qty
    }

    /// Targets for an Open, or why it may not be opened.
    pub fn protection(change: &PositionChange) -> Result<Protection, String> {
        let valid = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
        match (valid(change.take_profit), valid(change.stop_loss)) {
            (Some(take_profit), Some(stop_loss)) => Ok(Protection { stop_loss, take_profit }),
            (None, Some(_)) => Err("take-profit target missing".into()),
            (Some(_), None) => Err("stop-loss target missing".into()),
            (None, None)    => Err("take-profit and stop-loss targets missing".into()),
        }
    }

    /// Pre-trade check for one intent at its scaled size.
    pub fn check(&self, change: &PositionChange, scaled_qty: f64) -> RiskDecision {
        // [1] Protection gate
        if change.action == Action::Open {
            if let Err(reason) = Self::protection(change) {
                return RiskDecision::Blocked(reason);
            }
        }

        // [2] Notional cap, exposure-increasing only; unknown price skips it
        if change.action.increases_exposure() && change.reference_price > 0.0 {
            let notional = scaled_qty * change.reference_price;
            if notional > self.max_single_trade_amount {
                return RiskDecision::Blocked(format!(
                    "notional {notional:.2} USDT exceeds max single trade amount {:.2}",
                    self.max_single_trade_amount
                ));
            }
        }

        RiskDecision::Approved
    }
}
