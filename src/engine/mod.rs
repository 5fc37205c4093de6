//! Core engine: detect changes, gate risk, route orders, sequence cycles.

pub mod detector;
pub mod dispatcher;
pub mod orchestrator;
pub mod risk;
pub mod router;

pub use dispatcher::{MultiEnvironmentDispatcher, TradingMode};
pub use orchestrator::{CycleReport, CycleStage, FollowOrchestrator};
pub use risk::{RiskDecision, RiskPolicy};
pub use router::{ExecutionMode, OrderRouter};
