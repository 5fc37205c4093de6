//! # engine::router
//!
//! **Order Router**: turns a batch of [`TradeIntent`]s into orders on one
//! exchange session and reports one [`Outcome`] per intent.
//!
//! ## Per-intent pipeline
//! ```text
//! intent ─► tradable? ──no──► NotMirrored
//!             │
//!           scale ──< min (not Close)──► RejectedTooSmall
//!             │
//!           dry-run? ──yes──► SkippedDryRun
//!             │
//!           risk gate ──blocked──► RejectedRiskPolicy
//!             │
//!           Open   : entry ─► stop-loss ─► take-profit
//!           Close  : live size query ─► reduce-only exit (flat ⇒ AlreadyFlat)
//!           Add    : entry side
//!           Reduce : exit side, reduce-only
//! ```
//!
//! A failing intent never stops the batch. Only an unreachable exchange
//! (batch-level ping) fails the whole environment.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::FollowConfig;
use crate::engine::risk::{RiskDecision, RiskPolicy};
use crate::exchange::{Exchange, HoldSide, OrderRequest, Trigger, TriggerKind};
use crate::models::{
    Action, Direction, Environment, ExecutionResult, IntentOutcome, Outcome, PositionChange,
    TradeIntent,
};

/// Price source for protective triggers.
const TRIGGER_TYPE: &str = "fill_price";

// ─── Execution Mode ───────────────────────────────────────────────────────────

/// Decided once per cycle and threaded through; nothing below re-reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    DryRun,
}

impl ExecutionMode {
    pub fn from_config(config: &FollowConfig) -> Self {
        if config.dry_run { ExecutionMode::DryRun } else { ExecutionMode::Live }
    }
}

fn hold_side(direction: Direction) -> HoldSide {
    match direction {
        Direction::Long  => HoldSide::Long,
        Direction::Short => HoldSide::Short,
    }
}

fn is_tradable(intent: &TradeIntent) -> bool {
    intent.action().is_some_and(|a| a != Action::LeverageOnly)
}

// ─── Router ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OrderRouter {
    environment: Environment,
    exchange:    Arc<dyn Exchange>,
}

impl OrderRouter {
    pub fn new(environment: Environment, exchange: Arc<dyn Exchange>) -> Self {
        Self { environment, exchange }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn exchange(&self) -> &Arc<dyn Exchange> {
        &self.exchange
    }

    pub async fn execute(
        &self,
        intents: &[TradeIntent],
        config: &FollowConfig,
        mode: ExecutionMode,
    ) -> ExecutionResult {
        let env = self.environment;
        let policy = RiskPolicy::from_config(config);

        // ── Connectivity check ───────────────────────────────────────────────
        if mode == ExecutionMode::Live && intents.iter().any(is_tradable) {
            if let Err(e) = self.exchange.ping().await {
                error!(env = %env, exchange = self.exchange.name(), error = %e, "🛑 Environment unreachable, batch failed");
                return ExecutionResult::fatal(env, e.to_string(), intents.len());
            }
        }

        let mut result = ExecutionResult::new(env);
        for intent in intents {
            let (scaled_qty, outcome) = self.execute_one(intent, &policy, config.scale_ratio, mode).await;

            if outcome.is_unprotected() {
                error!(
                    env    = %env,
                    model  = %intent.model_id,
                    symbol = intent.symbol().unwrap_or("-"),
                    detail = %outcome.describe(),
                    "🚨 Position left WITHOUT protection"
                );
            } else if !outcome.is_success() {
                warn!(
                    env    = %env,
                    model  = %intent.model_id,
                    symbol = intent.symbol().unwrap_or("-"),
                    detail = %outcome.describe(),
                    "❌ Intent failed"
                );
            }

            result.record(IntentOutcome {
                model_id: intent.model_id.clone(),
                symbol:   intent.symbol().map(str::to_string),
                summary:  intent.summary.clone(),
                scaled_qty,
                outcome,
            });
        }

        info!(
            env     = %env,
            success = result.success_count,
            failed  = result.failed_count,
            "📊 Batch executed"
        );
        result
    }

    async fn execute_one(
        &self,
        intent: &TradeIntent,
        policy: &RiskPolicy,
        scale_ratio: f64,
        mode: ExecutionMode,
    ) -> (f64, Outcome) {
        let Some(change) = intent.change.as_ref() else {
            return (0.0, Outcome::NotMirrored { reason: "model-level event".into() });
        };
        if change.action == Action::LeverageOnly {
            return (0.0, Outcome::NotMirrored { reason: "leverage-only change".into() });
        }

        // ── 1. Scale ─────────────────────────────────────────────────────────
        // Close exits whatever the venue holds, so its scaled size is only
        // informational and never gates it.
        let scaled_qty = RiskPolicy::scale(change.quantity_delta, scale_ratio);
        if change.action != Action::Close && !policy.is_tradable(scaled_qty) {
            info!(
                env        = %self.environment,
                model      = %intent.model_id,
                symbol     = %change.symbol,
                scaled_qty,
                "🔹 Scaled size below minimum, skipped"
            );
            return (scaled_qty, Outcome::RejectedTooSmall { scaled_qty });
        }

        // ── 2. Dry-run ───────────────────────────────────────────────────────
        if mode == ExecutionMode::DryRun {
            info!(
                env        = %self.environment,
                model      = %intent.model_id,
                symbol     = %change.symbol,
                action     = change.action.label(),
                direction  = change.direction.label(),
                scaled_qty,
                "🎭 [DRY-RUN] Order not sent"
            );
            return (scaled_qty, Outcome::SkippedDryRun);
        }

        // ── 3. Risk gate ─────────────────────────────────────────────────────
        if let RiskDecision::Blocked(reason) = policy.check(change, scaled_qty) {
            return (scaled_qty, Outcome::RejectedRiskPolicy { reason });
        }

        // ── 4. Submit ────────────────────────────────────────────────────────
        let outcome = match change.action {
            Action::Open   => self.open(change, scaled_qty).await,
            Action::Close  => self.close(change).await,
            Action::Add    => self.adjust(change, scaled_qty, false).await,
            Action::Reduce => self.adjust(change, scaled_qty, true).await,
            Action::LeverageOnly => Outcome::NotMirrored { reason: "leverage-only change".into() },
        };
        (scaled_qty, outcome)
    }

    async fn open(&self, change: &PositionChange, qty: f64) -> Outcome {
        let protection = match RiskPolicy::protection(change) {
            Ok(p) => p,
            Err(reason) => return Outcome::RejectedRiskPolicy { reason },
        };
        let hold = hold_side(change.direction);

        let entry = OrderRequest::market(&change.symbol, hold.entry_side(), qty, hold);
        let entry_id = match self.exchange.submit_order(&entry).await {
            Ok(id) => id,
            Err(e) => return Outcome::FailedSubmission { reason: e.to_string() },
        };

        // Stop-loss first: it is the order that caps the loss.
        let protective = [
            (TriggerKind::StopLoss, protection.stop_loss, "stop-loss"),
            (TriggerKind::TakeProfit, protection.take_profit, "take-profit"),
        ];
        for (kind, price, label) in protective {
            let trigger = Trigger { kind, price, trigger_type: TRIGGER_TYPE };
            let order = OrderRequest::protective(&change.symbol, hold, qty, trigger);
            if let Err(e) = self.exchange.submit_order(&order).await {
                return Outcome::FailedProtection {
                    entry_order_id: entry_id,
                    reason: format!("{label} order failed: {e}"),
                };
            }
        }

        info!(
            env       = %self.environment,
            symbol    = %change.symbol,
            direction = change.direction.label(),
            qty,
            sl        = protection.stop_loss,
            tp        = protection.take_profit,
            order_id  = %entry_id,
            "✅ Position opened with protection"
        );
        Outcome::Submitted { order_id: entry_id }
    }

    /// Closing size comes from the venue, not from the detected delta.
    async fn close(&self, change: &PositionChange) -> Outcome {
        let live = match self.exchange.get_positions(&change.symbol).await {
            Ok(positions) => positions,
            Err(e) => {
                return Outcome::FailedSubmission { reason: format!("position query failed: {e}") }
            }
        };

        let held: Vec<_> = live.into_iter().filter(|p| p.size > 0.0).collect();
        if held.is_empty() {
            info!(env = %self.environment, symbol = %change.symbol, "🔹 Already flat, nothing to close");
            return Outcome::AlreadyFlat;
        }

        let mut order_ids = Vec::with_capacity(held.len());
        for position in held {
            if position.side != hold_side(change.direction) {
                warn!(
                    env       = %self.environment,
                    symbol    = %change.symbol,
                    held      = position.side.as_str(),
                    expected  = change.direction.label(),
                    "⚠️ Live position side differs from followed model, closing anyway"
                );
            }
            let order = OrderRequest::market(
                &change.symbol,
                position.side.exit_side(),
                position.size,
                position.side,
            )
            .reduce_only();

            match self.exchange.submit_order(&order).await {
                Ok(id) => order_ids.push(id),
                Err(e) => return Outcome::FailedSubmission { reason: e.to_string() },
            }
        }

        Outcome::Submitted { order_id: order_ids.join(",") }
    }

    async fn adjust(&self, change: &PositionChange, qty: f64, reduce: bool) -> Outcome {
        let hold = hold_side(change.direction);
        let order = if reduce {
            OrderRequest::market(&change.symbol, hold.exit_side(), qty, hold).reduce_only()
        } else {
            OrderRequest::market(&change.symbol, hold.entry_side(), qty, hold)
        };

        match self.exchange.submit_order(&order).await {
            Ok(order_id) => Outcome::Submitted { order_id },
            Err(e) => Outcome::FailedSubmission { reason: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{LivePosition, OrderSide, PaperExchange};
    use crate::models::IntentKind;
    use chrono::Utc;

    fn intent(action: Action, direction: Direction, qty: f64, tp: Option<f64>, sl: Option<f64>) -> TradeIntent {
        let kind = match action {
            Action::Open  => IntentKind::PositionOpened,
            Action::Close => IntentKind::PositionClosed,
            _             => IntentKind::PositionChanged,
        };
        TradeIntent {
            kind,
            model_id: "m".into(),
            change: Some(PositionChange {
                symbol: "BTC".into(),
                direction,
                action,
                quantity_delta: qty,
                quantity_before: 0.0,
                quantity_after: qty,
                leverage_before: Some(10),
                leverage_after: Some(10),
                entry_price_before: None,
                entry_price_after: Some(100.0),
                reference_price: 100.0,
                take_profit: tp,
                stop_loss: sl,
            }),
            summary: "test".into(),
            timestamp: Utc::now(),
        }
    }

    fn setup() -> (Arc<PaperExchange>, OrderRouter, FollowConfig) {
        let paper = Arc::new(PaperExchange::new("paper"));
        let router = OrderRouter::new(Environment::Live, paper.clone());
        let config = FollowConfig { enabled: true, scale_ratio: 1.0, ..Default::default() };
        (paper, router, config)
    }

    #[tokio::test]
    async fn open_without_take_profit_sends_nothing() {
        let (paper, router, config) = setup();
        let intents = [intent(Action::Open, Direction::Long, 1.0, None, Some(90.0))];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(matches!(result.outcomes[0].outcome, Outcome::RejectedRiskPolicy { .. }));
        assert_eq!(result.failed_count, 1);
        assert_eq!(paper.submission_attempts(), 0);
    }

    #[tokio::test]
    async fn open_places_entry_then_protection() {
        let (paper, router, config) = setup();
        let intents = [intent(Action::Open, Direction::Short, 2.0, Some(80.0), Some(110.0))];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;
        assert_eq!(result.success_count, 1);

        let orders = paper.orders().await;
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert!(!orders[0].reduce_only);
        assert_eq!(orders[1].trigger.map(|t| t.kind), Some(TriggerKind::StopLoss));
        assert_eq!(orders[1].side, OrderSide::Buy);
        assert!(orders[1].reduce_only);
        assert_eq!(orders[2].trigger.map(|t| (t.kind, t.price)), Some((TriggerKind::TakeProfit, 80.0)));
    }

    #[tokio::test]
    async fn protection_failure_is_distinct() {
        let (paper, router, config) = setup();
        paper.set_fail_protection(true);
        let intents = [intent(Action::Open, Direction::Long, 1.0, Some(120.0), Some(90.0))];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(result.outcomes[0].outcome.is_unprotected());
        assert_eq!(result.unprotected().count(), 1);
        assert_eq!(paper.get_positions("BTC").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sub_threshold_is_success_without_calls() {
        let (paper, router, mut config) = setup();
        config.scale_ratio = 0.01;
        let intents = [intent(Action::Add, Direction::Long, 0.001, None, None)];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(matches!(result.outcomes[0].outcome, Outcome::RejectedTooSmall { .. }));
        assert_eq!(result.success_count, 1);
        assert_eq!(paper.submission_attempts(), 0);
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let (paper, router, config) = setup();
        let intents = [
            intent(Action::Open, Direction::Long, 1.0, Some(120.0), Some(90.0)),
            intent(Action::Reduce, Direction::Long, 1.0, None, None),
        ];

        let result = router.execute(&intents, &config, ExecutionMode::DryRun).await;

        assert_eq!(result.success_count, 2);
        assert!(result.outcomes.iter().all(|o| o.outcome == Outcome::SkippedDryRun));
        assert_eq!(paper.submission_attempts(), 0);
    }

    #[tokio::test]
    async fn close_uses_live_size_and_is_idempotent() {
        let (paper, router, config) = setup();
        paper.seed_position("BTC", HoldSide::Long, 0.37).await;
        let intents = [intent(Action::Close, Direction::Long, 5.0, None, None)];

        let first = router.execute(&intents, &config, ExecutionMode::Live).await;
        let orders = paper.orders().await;
        assert_eq!(first.success_count, 1);
        assert_eq!(orders[0].amount, 0.37);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert!(orders[0].reduce_only);

        let second = router.execute(&intents, &config, ExecutionMode::Live).await;
        assert_eq!(second.outcomes[0].outcome, Outcome::AlreadyFlat);
        assert_eq!(second.success_count, 1);
    }

    #[tokio::test]
    async fn close_ignores_stale_delta_size() {
        let (paper, router, mut config) = setup();
        config.scale_ratio = 0.1;
        paper.seed_position("BTC", HoldSide::Long, 0.5).await;
        let intents = [intent(Action::Close, Direction::Long, 0.0005, None, None)];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(matches!(result.outcomes[0].outcome, Outcome::Submitted { .. }));
        let orders = paper.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!((orders[0].side, orders[0].amount, orders[0].reduce_only), (OrderSide::Sell, 0.5, true));
        assert!(paper.get_positions("BTC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_add_grows_and_short_reduce_shrinks() {
        let (paper, router, config) = setup();
        paper.seed_position("BTC", HoldSide::Short, 2.0).await;
        let short = |size| vec![LivePosition { side: HoldSide::Short, size }];

        let add = [intent(Action::Add, Direction::Short, 1.5, None, None)];
        let result = router.execute(&add, &config, ExecutionMode::Live).await;
        assert_eq!(result.success_count, 1);
        assert_eq!(paper.get_positions("BTC").await.unwrap(), short(3.5));

        let reduce = [intent(Action::Reduce, Direction::Short, 0.5, None, None)];
        let result = router.execute(&reduce, &config, ExecutionMode::Live).await;
        assert_eq!(result.success_count, 1);
        assert_eq!(paper.get_positions("BTC").await.unwrap(), short(3.0));

        let orders = paper.orders().await;
        assert_eq!((orders[0].side, orders[0].reduce_only), (OrderSide::Sell, false));
        assert_eq!((orders[1].side, orders[1].reduce_only), (OrderSide::Buy, true));
    }

    #[tokio::test]
    async fn add_and_reduce_sides() {
        let (paper, router, config) = setup();
        let intents = [
            intent(Action::Add, Direction::Short, 1.0, None, None),
            intent(Action::Reduce, Direction::Short, 0.5, None, None),
        ];

        router.execute(&intents, &config, ExecutionMode::Live).await;
        let orders = paper.orders().await;

        assert_eq!((orders[0].side, orders[0].reduce_only), (OrderSide::Sell, false));
        assert_eq!((orders[1].side, orders[1].reduce_only), (OrderSide::Buy, true));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let (paper, router, config) = setup();
        paper.set_fail_entries(true);
        let mut intents = vec![intent(Action::Add, Direction::Long, 1.0, None, None)];
        intents.push(TradeIntent { change: None, kind: IntentKind::ModelAdded, ..intents[0].clone() });
        intents.push(intent(Action::LeverageOnly, Direction::Long, 0.0, None, None));

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert_eq!(result.outcomes.len(), 3);
        assert!(matches!(result.outcomes[0].outcome, Outcome::FailedSubmission { .. }));
        assert!(matches!(result.outcomes[1].outcome, Outcome::NotMirrored { .. }));
        assert!(matches!(result.outcomes[2].outcome, Outcome::NotMirrored { .. }));
        assert_eq!((result.success_count, result.failed_count), (2, 1));
    }

    #[tokio::test]
    async fn unreachable_exchange_fails_whole_batch() {
        let (paper, router, config) = setup();
        paper.set_unreachable(true);
        let intents = [
            intent(Action::Add, Direction::Long, 1.0, None, None),
            intent(Action::Reduce, Direction::Long, 1.0, None, None),
        ];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(result.fatal_error.is_some());
        assert_eq!(result.failed_count, 2);
        assert_eq!(paper.submission_attempts(), 0);
    }

    #[tokio::test]
    async fn notional_cap_blocks_large_add() {
        let (paper, router, mut config) = setup();
        config.max_single_trade_amount = 50.0;
        let intents = [intent(Action::Add, Direction::Long, 1.0, None, None)];

        let result = router.execute(&intents, &config, ExecutionMode::Live).await;

        assert!(matches!(result.outcomes[0].outcome, Outcome::RejectedRiskPolicy { .. }));
        assert_eq!(paper.submission_attempts(), 0);
    }
}
