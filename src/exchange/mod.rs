//! # exchange
//!
//! Boundary between the order router and a derivatives venue.
//!
//! The router never speaks a wire protocol: it builds an [`OrderRequest`]
//! and hands it to whatever implements [`Exchange`].
//!
//! ```text
//! OrderRouter ──► dyn Exchange ──┬─► BitgetExchange  (signed REST, live / demo)
//!                                └─► PaperExchange   (in-memory, mock mode + tests)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bitget;
pub mod paper;

pub use bitget::{BitgetCredentials, BitgetExchange};
pub use paper::PaperExchange;

// ─── Order Vocabulary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy  => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy  => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// One-way-mode flag: which held direction an order affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldSide {
    Long,
    Short,
}

impl HoldSide {
    /// Side of an order that grows this position.
    pub fn entry_side(self) -> OrderSide {
        match self {
            HoldSide::Long  => OrderSide::Buy,
            HoldSide::Short => OrderSide::Sell,
        }
    }

    /// Side of an order that shrinks or closes this position.
    pub fn exit_side(self) -> OrderSide {
        self.entry_side().opposite()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HoldSide::Long  => "long",
            HoldSide::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

/// Conditional part of a protective order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trigger {
    pub kind:  TriggerKind,
    pub price: f64,
    /// Price source the venue watches, e.g. `fill_price` or `mark_price`.
    pub trigger_type: &'static str,
}

/// Venue-neutral order. `symbol` is the base coin (`BTC`); the client maps it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol:      String,
    pub side:        OrderSide,
    pub amount:      f64,
    pub hold_side:   HoldSide,
    pub reduce_only: bool,
    pub trigger:     Option<Trigger>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, amount: f64, hold_side: HoldSide) -> Self {
        Self {
            symbol:      symbol.to_string(),
            side,
            amount,
            hold_side,
            reduce_only: false,
            trigger:     None,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// Reduce-only trigger order protecting a `hold_side` position.
    pub fn protective(symbol: &str, hold_side: HoldSide, amount: f64, trigger: Trigger) -> Self {
        Self {
            trigger: Some(trigger),
            ..Self::market(symbol, hold_side.exit_side(), amount, hold_side).reduce_only()
        }
    }

    pub fn is_protective(&self) -> bool {
        self.trigger.is_some()
    }
}

/// One open position as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivePosition {
    pub side: HoldSide,
    pub size: f64,
}

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Request never got an HTTP response (DNS, TLS, timeout, refused).
    #[error("exchange unreachable: {0}")]
    Transport(String),

    #[error("exchange HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Venue answered but refused the request.
    #[error("exchange rejected ({code}): {msg}")]
    Rejected { code: String, msg: String },

    #[error("unexpected exchange response: {0}")]
    Decode(String),
}

// ─── Exchange Trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap authenticated call; failure means the venue is unusable.
    async fn ping(&self) -> Result<(), ExchangeError>;

    /// Startup preparation (position mode and the like). Defaults to nothing.
    async fn prepare(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    /// Returns the venue's order id.
    async fn submit_order(&self, order: &OrderRequest) -> Result<String, ExchangeError>;

    /// Non-empty positions held on `symbol` (base coin).
    async fn get_positions(&self, symbol: &str) -> Result<Vec<LivePosition>, ExchangeError>;
}
