//! # models::outcome
//!
//! Execution results. Every intent that reaches the router ends in exactly
//! one [`Outcome`]; callers match on it exhaustively instead of reading
//! string or boolean flags.

use serde::{Deserialize, Serialize};

// ─── Environment ──────────────────────────────────────────────────────────────

/// Exchange session an order batch runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Demo,
    Live,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Demo => write!(f, "demo"),
            Environment::Live => write!(f, "live"),
        }
    }
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Order(s) accepted. For an Open this includes the protective orders.
    Submitted { order_id: String },
    /// Close requested but the live position was already flat.
    AlreadyFlat,
    /// Intent carries nothing to trade (model-level event, leverage-only change).
    NotMirrored { reason: String },
    /// Execution mode was dry-run; no network call made.
    SkippedDryRun,
    /// Scaled size below the minimum tradable quantity.
    RejectedTooSmall { scaled_qty: f64 },
    /// Blocked before submission by the risk policy.
    RejectedRiskPolicy { reason: String },
    /// Exchange refused or never received the order.
    FailedSubmission { reason: String },
    /// Entry filled but a protective order failed: position is exposed.
    FailedProtection { entry_order_id: String, reason: String },
}

impl Outcome {
    /// Counts toward `success_count`. Sub-threshold and non-tradable intents
    /// are no-ops, not errors.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Submitted { .. }
                | Outcome::AlreadyFlat
                | Outcome::NotMirrored { .. }
                | Outcome::SkippedDryRun
                | Outcome::RejectedTooSmall { .. }
        )
    }

    /// High-severity outcome: real exposure without stop-loss.
    pub fn is_unprotected(&self) -> bool {
        matches!(self, Outcome::FailedProtection { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Submitted { order_id }  => format!("submitted (order {order_id})"),
            Outcome::AlreadyFlat             => "already flat".to_string(),
            Outcome::NotMirrored { reason }  => format!("not mirrored: {reason}"),
            Outcome::SkippedDryRun           => "dry-run, not sent".to_string(),
            Outcome::RejectedTooSmall { scaled_qty } => {
                format!("skipped: scaled size {scaled_qty} below minimum")
            }
            Outcome::RejectedRiskPolicy { reason } => format!("risk rejected: {reason}"),
            Outcome::FailedSubmission { reason }   => format!("failed: {reason}"),
            Outcome::FailedProtection { entry_order_id, reason } => {
                format!("UNPROTECTED: entry {entry_order_id} filled, protection failed: {reason}")
            }
        }
    }
}

// ─── IntentOutcome ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub model_id: String,
    pub symbol:   Option<String>,
    pub summary:  String,
    /// Size actually sent (or that would have been sent); 0 when not computed.
    pub scaled_qty: f64,
    pub outcome:  Outcome,
}

// ─── ExecutionResult ──────────────────────────────────────────────────────────

/// Result of one batch against one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub environment:   Environment,
    pub success_count: usize,
    pub failed_count:  usize,
    pub outcomes:      Vec<IntentOutcome>,
    /// Set when the environment could not be reached at all; every intent of
    /// the batch is then counted as failed.
    pub fatal_error:   Option<String>,
}

impl ExecutionResult {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            success_count: 0,
            failed_count:  0,
            outcomes:      Vec::new(),
            fatal_error:   None,
        }
    }

    pub fn record(&mut self, outcome: IntentOutcome) {
        if outcome.outcome.is_success() {
            self.success_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Whole-environment failure: nothing ran.
    pub fn fatal(environment: Environment, reason: String, intent_count: usize) -> Self {
        Self {
            environment,
            success_count: 0,
            failed_count:  intent_count,
            outcomes:      Vec::new(),
            fatal_error:   Some(reason),
        }
    }

    pub fn unprotected(&self) -> impl Iterator<Item = &IntentOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_unprotected())
    }
}

// ─── DispatchReport ───────────────────────────────────────────────────────────

/// Demo and live results kept apart, plus the summed totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub demo: Option<ExecutionResult>,
    pub live: Option<ExecutionResult>,
    pub total_success: usize,
    pub total_failed:  usize,
}

impl DispatchReport {
    pub fn from_results(demo: Option<ExecutionResult>, live: Option<ExecutionResult>) -> Self {
        let (total_success, total_failed) = demo
            .iter()
            .chain(live.iter())
            .fold((0, 0), |(s, f), r| (s + r.success_count, f + r.failed_count));

        Self { demo, live, total_success, total_failed }
    }

    pub fn results(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.demo.iter().chain(self.live.iter())
    }
}
