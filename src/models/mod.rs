//! Domain models shared across the entire Mirrortrade system.

pub mod intent;
pub mod outcome;
pub mod snapshot;

pub use intent::{Action, Direction, IntentKind, PositionChange, TradeIntent};
pub use outcome::{DispatchReport, Environment, ExecutionResult, IntentOutcome, Outcome};
pub use snapshot::{ExitPlan, ModelPositions, PositionRecord, Snapshot};
