//! # models::intent
//!
//! Defines [`TradeIntent`]: the single output unit of change detection.
//!
//! An intent is a value object: produced once by the detector, carried
//! unchanged through whitelist filtering, consumed once by the router. The
//! closed [`Action`] enum is decided at detection time so nothing downstream
//! ever re-derives the operation from text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Direction ────────────────────────────────────────────────────────────────

/// Held direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Positive quantity is long; anything else is short.
    #[inline]
    pub fn from_quantity(quantity: f64) -> Self {
        if quantity > 0.0 { Direction::Long } else { Direction::Short }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Long  => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

// ─── IntentKind / Action ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    ModelAdded,
    ModelRemoved,
    PositionOpened,
    PositionClosed,
    PositionChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Open,
    Close,
    Add,
    Reduce,
    /// Quantity unchanged, leverage changed. Carries no tradable size.
    LeverageOnly,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Open         => "open",
            Action::Close        => "close",
            Action::Add          => "add",
            Action::Reduce       => "reduce",
            Action::LeverageOnly => "leverage",
        }
    }

    /// Open and Add grow the follower's exposure.
    #[inline]
    pub fn increases_exposure(self) -> bool {
        matches!(self, Action::Open | Action::Add)
    }
}

// ─── PositionChange ───────────────────────────────────────────────────────────

/// Symbol-level payload of an intent. Absent for model-level intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChange {
    pub symbol:    String,
    pub direction: Direction,
    pub action:    Action,
    /// Absolute size of the change in the followed model's units.
    pub quantity_delta: f64,
    /// Signed quantities on either side of the change (0 when absent).
    pub quantity_before: f64,
    pub quantity_after:  f64,
    pub leverage_before: Option<u32>,
    pub leverage_after:  Option<u32>,
    pub entry_price_before: Option<f64>,
    pub entry_price_after:  Option<f64>,
    /// Mark price reported with the newest record; 0 when unknown.
    pub reference_price: f64,
    pub take_profit: Option<f64>,
    pub stop_loss:   Option<f64>,
}

// ─── TradeIntent ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub kind:      IntentKind,
    pub model_id:  String,
    pub change:    Option<PositionChange>,
    /// Human-readable one-liner used in logs and notifications.
    pub summary:   String,
    pub timestamp: DateTime<Utc>,
}

impl TradeIntent {
    pub fn symbol(&self) -> Option<&str> {
        self.change.as_ref().map(|c| c.symbol.as_str())
    }

    pub fn action(&self) -> Option<Action> {
        self.change.as_ref().map(|c| c.action)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.change.as_ref().map(|c| c.direction)
    }
}
