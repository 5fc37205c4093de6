//! # exchange::paper
//!
//! In-memory venue. Backs `BITGET_TRADING_MODE=paper` and doubles as the
//! fake exchange in tests: every accepted order is recorded, market orders
//! move the simulated one-way position, and failures can be injected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{Exchange, ExchangeError, HoldSide, LivePosition, OrderRequest, OrderSide};

pub struct PaperExchange {
    name:       String,
    orders:     Mutex<Vec<OrderRequest>>,
    positions:  Mutex<HashMap<String, LivePosition>>,
    next_id:    AtomicU64,
    /// Submission attempts, accepted or not.
    attempts:   AtomicU64,

    // ── Failure injection ────────────────────────────────────────────────────
    unreachable:        AtomicBool,
    fail_entries:       AtomicBool,
    fail_protection:    AtomicBool,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:            name.into(),
            orders:          Mutex::new(Vec::new()),
            positions:       Mutex::new(HashMap::new()),
            next_id:         AtomicU64::new(1),
            attempts:        AtomicU64::new(0),
            unreachable:     AtomicBool::new(false),
            fail_entries:    AtomicBool::new(false),
            fail_protection: AtomicBool::new(false),
        }
    }

    /// `ping` and every call fail with a transport error.
    pub fn set_unreachable(&self, on: bool) {
        self.unreachable.store(on, Ordering::SeqCst);
    }

    /// Plain (non-trigger) orders are rejected.
    pub fn set_fail_entries(&self, on: bool) {
        self.fail_entries.store(on, Ordering::SeqCst);
    }

    /// Trigger (stop-loss / take-profit) orders are rejected.
    pub fn set_fail_protection(&self, on: bool) {
        self.fail_protection.store(on, Ordering::SeqCst);
    }

    pub async fn seed_position(&self, symbol: &str, side: HoldSide, size: f64) {
        self.positions
            .lock()
            .await
            .insert(symbol.to_string(), LivePosition { side, size });
    }

    /// Accepted orders, in submission order.
    pub async fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().await.clone()
    }

    pub fn submission_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), ExchangeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ExchangeError::Transport(format!("{} is offline", self.name)));
        }
        Ok(())
    }

    /// Move the simulated one-way position by a filled market order.
    ///
    /// Reduce-only orders must face an open position and are clamped to
    /// its size, like the venue does.
    fn apply_fill(
        positions: &mut HashMap<String, LivePosition>,
        order: &OrderRequest,
    ) -> Result<(), ExchangeError> {
        if order.reduce_only {
            let Some(held) = positions.get(&order.symbol).copied() else {
                return Err(ExchangeError::Rejected {
                    code: "paper".into(),
                    msg:  format!("no {} position to reduce", order.symbol),
                });
            };
            if order.side == held.side.entry_side() {
                return Err(ExchangeError::Rejected {
                    code: "paper".into(),
                    msg:  format!(
                        "reduce-only {} would grow the {} {} position",
                        order.side.as_str(),
                        held.side.as_str(),
                        order.symbol
                    ),
                });
            }

            let left = held.size - order.amount.min(held.size);
            if left < 1e-12 {
                positions.remove(&order.symbol);
            } else {
                positions.insert(order.symbol.clone(), LivePosition { side: held.side, size: left });
            }
            return Ok(());
        }

        let signed = |p: &LivePosition| match p.side {
            HoldSide::Long  => p.size,
            HoldSide::Short => -p.size,
        };
        let held = positions.get(&order.symbol).map(signed).unwrap_or(0.0);
        let next = held + match order.side {
            OrderSide::Buy  => order.amount,
            OrderSide::Sell => -order.amount,
        };

        if next.abs() < 1e-12 {
            positions.remove(&order.symbol);
        } else {
            let side = if next > 0.0 { HoldSide::Long } else { HoldSide::Short };
            positions.insert(order.symbol.clone(), LivePosition { side, size: next.abs() });
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        self.check_reachable()
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<String, ExchangeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let injected = if order.is_protective() {
            self.fail_protection.load(Ordering::SeqCst)
        } else {
            self.fail_entries.load(Ordering::SeqCst)
        };
        if injected {
            return Err(ExchangeError::Rejected {
                code: "paper".into(),
                msg:  "injected failure".into(),
            });
        }

        if !order.is_protective() {
            Self::apply_fill(&mut *self.positions.lock().await, order)?;
        }
        let order_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders.lock().await.push(order.clone());

        info!(
            exchange = %self.name,
            order_id = %order_id,
            symbol   = %order.symbol,
            side     = order.side.as_str(),
            amount   = order.amount,
            reduce   = order.reduce_only,
            "🎭 [PAPER] Order accepted"
        );
        Ok(order_id)
    }

    async fn get_positions(&self, symbol: &str) -> Result<Vec<LivePosition>, ExchangeError> {
        self.check_reachable()?;
        Ok(self.positions.lock().await.get(symbol).copied().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn market_orders_move_the_position() {
        let ex = PaperExchange::new("paper");
        ex.submit_order(&OrderRequest::market("BTC", OrderSide::Buy, 2.0, HoldSide::Long))
            .await
            .unwrap();
        ex.submit_order(
            &OrderRequest::market("BTC", OrderSide::Sell, 5.0, HoldSide::Long).reduce_only(),
        )
        .await
        .unwrap();

        assert!(ex.get_positions("BTC").await.unwrap().is_empty());
        assert_eq!(ex.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn reduce_only_shrinks_a_short_and_is_clamped() {
        let ex = PaperExchange::new("paper");
        ex.seed_position("ETH", HoldSide::Short, 3.0).await;

        let buy = |amount| OrderRequest::market("ETH", OrderSide::Buy, amount, HoldSide::Short).reduce_only();
        ex.submit_order(&buy(1.0)).await.unwrap();
        assert_eq!(
            ex.get_positions("ETH").await.unwrap(),
            vec![LivePosition { side: HoldSide::Short, size: 2.0 }]
        );

        ex.submit_order(&buy(10.0)).await.unwrap();
        assert!(ex.get_positions("ETH").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reduce_only_never_grows_or_opens() {
        let ex = PaperExchange::new("paper");
        ex.seed_position("ETH", HoldSide::Short, 3.0).await;

        let wrong_side = OrderRequest::market("ETH", OrderSide::Sell, 1.0, HoldSide::Short).reduce_only();
        assert!(matches!(
            ex.submit_order(&wrong_side).await,
            Err(ExchangeError::Rejected { .. })
        ));
        assert_eq!(
            ex.get_positions("ETH").await.unwrap(),
            vec![LivePosition { side: HoldSide::Short, size: 3.0 }]
        );

        let nothing_held = OrderRequest::market("BTC", OrderSide::Sell, 1.0, HoldSide::Long).reduce_only();
        assert!(matches!(
            ex.submit_order(&nothing_held).await,
            Err(ExchangeError::Rejected { .. })
        ));
        assert!(ex.get_positions("BTC").await.unwrap().is_empty());
        assert!(ex.orders().await.is_empty());
        assert_eq!(ex.submission_attempts(), 2);
    }

    #[tokio::test]
    async fn injected_failures() {
        let ex = PaperExchange::new("paper");
        ex.set_fail_entries(true);
        let order = OrderRequest::market("ETH", OrderSide::Sell, 1.0, HoldSide::Short);
        assert!(matches!(
            ex.submit_order(&order).await,
            Err(ExchangeError::Rejected { .. })
        ));

        ex.set_fail_entries(false);
        ex.set_unreachable(true);
        assert!(matches!(ex.ping().await, Err(ExchangeError::Transport(_))));
        assert_eq!(ex.submission_attempts(), 1);
        assert!(ex.orders().await.is_empty());
    }
}
