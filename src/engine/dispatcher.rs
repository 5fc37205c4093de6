//! # engine::dispatcher
//!
//! **Multi-Environment Dispatcher**: runs the same intent batch against the
//! demo and live sessions independently.
//!
//! ```text
//!              ┌─► demo router ─► ExecutionResult ─┐
//! intents ─────┤                                    ├─► DispatchReport
//!              └─► live router ─► ExecutionResult ─┘
//! ```
//!
//! Each environment runs in its own task, so even a panic in one leaves the
//! other's result intact. Totals are summed by field after both finish.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::FollowConfig;
use crate::engine::router::{ExecutionMode, OrderRouter};
use crate::models::{DispatchReport, ExecutionResult, TradeIntent};

pub use crate::models::Environment;

// ─── Trading Mode ─────────────────────────────────────────────────────────────

/// Which sessions the process trades on (`BITGET_TRADING_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    DemoOnly,
    LiveOnly,
    Both,
    /// In-memory exchange standing in for the demo session.
    Paper,
}

impl TradingMode {
    pub fn uses_demo(self) -> bool {
        matches!(self, TradingMode::DemoOnly | TradingMode::Both)
    }

    pub fn uses_live(self) -> bool {
        matches!(self, TradingMode::LiveOnly | TradingMode::Both)
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "demo"  => Ok(TradingMode::DemoOnly),
            "1" | "live"  => Ok(TradingMode::LiveOnly),
            "2" | "both"  => Ok(TradingMode::Both),
            "paper" | "mock" => Ok(TradingMode::Paper),
            other => Err(format!(
                "unknown trading mode '{other}' (use 0|demo, 1|live, 2|both, paper)"
            )),
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::DemoOnly => write!(f, "demo"),
            TradingMode::LiveOnly => write!(f, "live"),
            TradingMode::Both     => write!(f, "demo + live"),
            TradingMode::Paper    => write!(f, "paper"),
        }
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MultiEnvironmentDispatcher {
    demo: Option<OrderRouter>,
    live: Option<OrderRouter>,
}

impl MultiEnvironmentDispatcher {
    pub fn new(demo: Option<OrderRouter>, live: Option<OrderRouter>) -> Self {
        Self { demo, live }
    }

    pub fn is_empty(&self) -> bool {
        self.demo.is_none() && self.live.is_none()
    }

    pub fn routers(&self) -> impl Iterator<Item = &OrderRouter> {
        self.demo.iter().chain(self.live.iter())
    }

    /// Startup: one-way position mode (non-fatal) and an account check.
    pub async fn prepare(&self) {
        for router in self.routers() {
            let env = router.environment();
            let exchange = router.exchange();

            if let Err(e) = exchange.prepare().await {
                warn!(env = %env, exchange = exchange.name(), error = %e, "⚠️ Position mode not changed (may already be one-way)");
            }
            match exchange.ping().await {
                Ok(())  => info!(env = %env, exchange = exchange.name(), "✅ Exchange session ready"),
                Err(e)  => error!(env = %env, exchange = exchange.name(), error = %e, "❌ Exchange check failed"),
            }
        }
    }

    pub async fn execute(
        &self,
        intents: &[TradeIntent],
        config: &FollowConfig,
        mode: ExecutionMode,
    ) -> DispatchReport {
        let intents: Arc<[TradeIntent]> = intents.into();
        let config = Arc::new(config.clone());

        let (demo, live) = tokio::join!(
            run_isolated(self.demo.clone(), intents.clone(), config.clone(), mode),
            run_isolated(self.live.clone(), intents.clone(), config.clone(), mode),
        );

        let report = DispatchReport::from_results(demo, live);
        info!(
            success = report.total_success,
            failed  = report.total_failed,
            "📦 Dispatch complete"
        );
        report
    }
}

async fn run_isolated(
    router: Option<OrderRouter>,
    intents: Arc<[TradeIntent]>,
    config: Arc<FollowConfig>,
    mode: ExecutionMode,
) -> Option<ExecutionResult> {
    let router = router?;
    let env = router.environment();
    let count = intents.len();

    let handle = tokio::spawn(async move { router.execute(&intents, &config, mode).await });
    match handle.await {
        Ok(result) => Some(result),
        Err(e) => {
            error!(env = %env, error = %e, "🛑 Environment task aborted");
            Some(ExecutionResult::fatal(env, format!("execution task aborted: {e}"), count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::models::{Action, Direction, IntentKind, PositionChange};
    use chrono::Utc;

    fn add_intent(model: &str) -> TradeIntent {
        TradeIntent {
            kind: IntentKind::PositionChanged,
            model_id: model.into(),
            change: Some(PositionChange {
                symbol: "ETH".into(),
                direction: Direction::Long,
                action: Action::Add,
                quantity_delta: 1.0,
                quantity_before: 1.0,
                quantity_after: 2.0,
                leverage_before: Some(5),
                leverage_after: Some(5),
                entry_price_before: Some(10.0),
                entry_price_after: Some(10.0),
                reference_price: 10.0,
                take_profit: None,
                stop_loss: None,
            }),
            summary: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn trading_mode_parsing() {
        assert_eq!("0".parse::<TradingMode>(), Ok(TradingMode::DemoOnly));
        assert_eq!("LIVE".parse::<TradingMode>(), Ok(TradingMode::LiveOnly));
        assert_eq!("2".parse::<TradingMode>(), Ok(TradingMode::Both));
        assert_eq!("paper".parse::<TradingMode>(), Ok(TradingMode::Paper));
        assert!("3".parse::<TradingMode>().is_err());
        assert!(TradingMode::Both.uses_demo() && TradingMode::Both.uses_live());
    }

    #[tokio::test]
    async fn environments_are_isolated() {
        let demo = Arc::new(PaperExchange::new("demo"));
        let live = Arc::new(PaperExchange::new("live"));
        demo.set_fail_entries(true);

        let dispatcher = MultiEnvironmentDispatcher::new(
            Some(OrderRouter::new(Environment::Demo, demo.clone())),
            Some(OrderRouter::new(Environment::Live, live.clone())),
        );
        let config = FollowConfig { enabled: true, scale_ratio: 1.0, ..Default::default() };
        let intents = [add_intent("a"), add_intent("b")];

        let report = dispatcher.execute(&intents, &config, ExecutionMode::Live).await;

        let demo_result = report.demo.as_ref().unwrap();
        let live_result = report.live.as_ref().unwrap();
        assert_eq!((demo_result.success_count, demo_result.failed_count), (0, 2));
        assert_eq!((live_result.success_count, live_result.failed_count), (2, 0));
        assert_eq!((report.total_success, report.total_failed), (2, 2));
        assert_eq!(live.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_environment_does_not_block_the_other() {
        let demo = Arc::new(PaperExchange::new("demo"));
        let live = Arc::new(PaperExchange::new("live"));
        live.set_unreachable(true);

        let dispatcher = MultiEnvironmentDispatcher::new(
            Some(OrderRouter::new(Environment::Demo, demo.clone())),
            Some(OrderRouter::new(Environment::Live, live)),
        );
        let config = FollowConfig { scale_ratio: 1.0, ..Default::default() };

        let report = dispatcher.execute(&[add_intent("a")], &config, ExecutionMode::Live).await;

        assert!(report.live.as_ref().unwrap().fatal_error.is_some());
        assert_eq!(report.demo.as_ref().unwrap().success_count, 1);
        assert_eq!(demo.orders().await.len(), 1);
    }
}
