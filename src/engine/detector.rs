//! # engine::detector
//!
//! **Change Detector**: diffs two snapshots into an ordered list of
//! [`TradeIntent`]s.
//!
//! ## Classification
//! ```text
//! model:  absent → present   ModelAdded
//!         present → absent   ModelRemoved
//!         present → present  ↓ symbol diff
//!
//! symbol: absent → present   PositionOpened  (Open,  dir = sign(current))
//!         present → absent   PositionClosed  (Close, dir = sign(previous))
//!         present → present  qty & lev equal → nothing
//!                            sign flipped   → Close (old dir) + Open (new dir)
//!                            |cur| > |prev| → Add     (dir = sign(current))
//!                            |cur| < |prev| → Reduce  (dir = sign(current))
//!                            |cur| = |prev| → LeverageOnly
//! ```
//!
//! Pure: no I/O, inputs untouched, models and symbols visited in
//! lexicographic order so identical inputs give identical output.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{
    Action, IntentKind, ModelPositions, PositionChange, PositionRecord, Snapshot, TradeIntent,
};

/// Detect with the current wall-clock time stamped on every intent.
pub fn detect(
    previous: &Snapshot,
    current: &Snapshot,
    allowed_models: Option<&HashSet<String>>,
) -> Vec<TradeIntent> {
    detect_at(previous, current, allowed_models, Utc::now())
}

/// Same as [`detect`] with an explicit timestamp.
///
/// An empty allow-list means "all models".
pub fn detect_at(
    previous: &Snapshot,
    current: &Snapshot,
    allowed_models: Option<&HashSet<String>>,
    at: DateTime<Utc>,
) -> Vec<TradeIntent> {
    let allowed = allowed_models.filter(|set| !set.is_empty());

    let model_ids: BTreeSet<&String> = previous
        .models
        .keys()
        .chain(current.models.keys())
        .filter(|id| allowed.map_or(true, |set| set.contains(id.as_str())))
        .collect();

    debug!(
        previous_models = previous.models.len(),
        current_models  = current.models.len(),
        checked         = model_ids.len(),
        "Diffing snapshots"
    );

    let mut intents = Vec::new();
    for model_id in model_ids {
        match (previous.model(model_id), current.model(model_id)) {
            (None, Some(_)) => intents.push(model_event(IntentKind::ModelAdded, model_id, at)),
            (Some(_), None) => intents.push(model_event(IntentKind::ModelRemoved, model_id, at)),
            (Some(prev), Some(cur)) => diff_model(model_id, prev, cur, at, &mut intents),
            (None, None) => {}
        }
    }

    if !intents.is_empty() {
        info!(count = intents.len(), "🔍 Position changes detected");
    }
    intents
}

// ─── Model Level ──────────────────────────────────────────────────────────────

fn model_event(kind: IntentKind, model_id: &str, at: DateTime<Utc>) -> TradeIntent {
    let summary = match kind {
        IntentKind::ModelAdded => format!("new model {model_id} started trading"),
        _                      => format!("model {model_id} stopped trading"),
    };
    TradeIntent {
        kind,
        model_id: model_id.to_string(),
        change: None,
        summary,
        timestamp: at,
    }
}

fn diff_model(
    model_id: &str,
    prev: &ModelPositions,
    cur: &ModelPositions,
    at: DateTime<Utc>,
    out: &mut Vec<TradeIntent>,
) {
    let symbols: BTreeSet<&String> = prev.positions.keys().chain(cur.positions.keys()).collect();

    for symbol in symbols {
        // Flat records are treated as absent: one-way mode, nothing held.
        let changes = match (prev.position(symbol), cur.position(symbol)) {
            (None, Some(c)) => vec![(IntentKind::PositionOpened, opened(symbol, c))],
            (Some(p), None) => vec![(IntentKind::PositionClosed, closed(symbol, p))],
            // A sign flip is a full exit followed by a fresh entry.
            (Some(p), Some(c)) if p.direction() != c.direction() => vec![
                (IntentKind::PositionClosed, closed(symbol, p)),
                (IntentKind::PositionOpened, opened(symbol, c)),
            ],
            (Some(p), Some(c)) => changed(symbol, p, c)
                .map(|ch| (IntentKind::PositionChanged, ch))
                .into_iter()
                .collect(),
            (None, None) => Vec::new(),
        };

        for (kind, change) in changes {
            out.push(TradeIntent {
                kind,
                model_id: model_id.to_string(),
                summary: summarize(model_id, &change),
                change: Some(change),
                timestamp: at,
            });
        }
    }
}

// ─── Symbol Level ─────────────────────────────────────────────────────────────

fn opened(symbol: &str, cur: &PositionRecord) -> PositionChange {
    PositionChange {
        symbol:             symbol.to_string(),
        direction:          cur.direction(),
        action:             Action::Open,
        quantity_delta:     cur.quantity.abs(),
        quantity_before:    0.0,
        quantity_after:     cur.quantity,
        leverage_before:    None,
        leverage_after:     Some(cur.leverage),
        entry_price_before: None,
        entry_price_after:  Some(cur.entry_price),
        reference_price:    cur.current_price,
        take_profit:        cur.exit_plan.profit_target,
        stop_loss:          cur.exit_plan.stop_loss,
    }
}

fn closed(symbol: &str, prev: &PositionRecord) -> PositionChange {
    PositionChange {
        symbol:             symbol.to_string(),
        direction:          prev.direction(),
        action:             Action::Close,
        quantity_delta:     prev.quantity.abs(),
        quantity_before:    prev.quantity,
        quantity_after:     0.0,
        leverage_before:    Some(prev.leverage),
        leverage_after:     None,
        entry_price_before: Some(prev.entry_price),
        entry_price_after:  None,
        reference_price:    prev.current_price,
        take_profit:        prev.exit_plan.profit_target,
        stop_loss:          prev.exit_plan.stop_loss,
    }
}

fn changed(symbol: &str, prev: &PositionRecord, cur: &PositionRecord) -> Option<PositionChange> {
    if prev.quantity == cur.quantity && prev.leverage == cur.leverage {
        return None;
    }

    // Same sign here, so size is the magnitude for either direction.
    let before = prev.quantity.abs();
    let after = cur.quantity.abs();
    let action = if after > before {
        Action::Add
    } else if after < before {
        Action::Reduce
    } else {
        Action::LeverageOnly
    };

    Some(PositionChange {
        symbol:             symbol.to_string(),
        direction:          cur.direction(),
        action,
        quantity_delta:     (after - before).abs(),
        quantity_before:    prev.quantity,
        quantity_after:     cur.quantity,
        leverage_before:    Some(prev.leverage),
        leverage_after:     Some(cur.leverage),
        entry_price_before: Some(prev.entry_price),
        entry_price_after:  Some(cur.entry_price),
        reference_price:    cur.current_price,
        take_profit:        cur.exit_plan.profit_target,
        stop_loss:          cur.exit_plan.stop_loss,
    })
}

// ─── Summary Text ─────────────────────────────────────────────────────────────

fn target(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn summarize(model_id: &str, c: &PositionChange) -> String {
    let dir = c.direction.label();
    let tp = target(c.take_profit);
    let sl = target(c.stop_loss);

    match c.action {
        Action::Open => format!(
            "{model_id} {} opened {dir} {} (leverage {}x, entry {}, mark {}, TP {tp}, SL {sl})",
            c.symbol, c.quantity_delta, opt(c.leverage_after), opt(c.entry_price_after),
            c.reference_price,
        ),
        Action::Close => format!(
            "{model_id} {} closed {dir} {} (leverage {}x, entry {}, mark {}, TP {tp}, SL {sl})",
            c.symbol, c.quantity_delta, opt(c.leverage_before), opt(c.entry_price_before),
            c.reference_price,
        ),
        Action::LeverageOnly => format!(
            "{model_id} {} {dir} leverage {}x → {}x (size {}, entry {}, mark {}, TP {tp}, SL {sl})",
            c.symbol, opt(c.leverage_before), opt(c.leverage_after), c.quantity_after,
            opt(c.entry_price_after), c.reference_price,
        ),
        Action::Add | Action::Reduce => format!(
            "{model_id} {} {} {dir} {}: {} → {} (leverage {}x → {}x, entry {} → {}, mark {}, TP {tp}, SL {sl})",
            c.symbol, c.action.label(), c.quantity_delta, c.quantity_before, c.quantity_after,
            opt(c.leverage_before), opt(c.leverage_after), opt(c.entry_price_before),
            opt(c.entry_price_after), c.reference_price,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitPlan};
    use std::collections::BTreeMap;

    fn record(quantity: f64, leverage: u32) -> PositionRecord {
        PositionRecord {
            quantity,
            leverage,
            entry_price: 100.0,
            current_price: 101.0,
            margin: 0.0,
            unrealized_pnl: 0.0,
            closed_pnl: 0.0,
            exit_plan: ExitPlan { profit_target: Some(120.0), stop_loss: Some(90.0) },
            entry_time: None,
            entry_oid: None,
            tp_oid: None,
            sl_oid: None,
        }
    }

    fn snapshot(models: &[(&str, &[(&str, PositionRecord)])]) -> Snapshot {
        let mut snap = Snapshot::new(Utc::now());
        for (model, positions) in models {
            let positions: BTreeMap<String, PositionRecord> = positions
                .iter()
                .map(|(s, r)| (s.to_string(), r.clone()))
                .collect();
            snap.models.insert(
                model.to_string(),
                ModelPositions { realized_pnl: 0.0, timestamp: 0.0, positions },
            );
        }
        snap
    }

    #[test]
    fn add_on_long() {
        let prev = snapshot(&[("m", &[("BTC", record(10.0, 5))])]);
        let cur = snapshot(&[("m", &[("BTC", record(15.0, 5))])]);

        let intents = detect(&prev, &cur, None);
        assert_eq!(intents.len(), 1);
        let c = intents[0].change.as_ref().unwrap();
        assert_eq!(intents[0].kind, IntentKind::PositionChanged);
        assert_eq!(c.action, Action::Add);
        assert_eq!(c.direction, Direction::Long);
        assert_eq!(c.quantity_delta, 5.0);
    }

    #[test]
    fn reduce_on_short() {
        let prev = snapshot(&[("m", &[("ETH", record(-10.0, 5))])]);
        let cur = snapshot(&[("m", &[("ETH", record(-4.0, 5))])]);

        let intents = detect(&prev, &cur, None);
        let c = intents[0].change.as_ref().unwrap();
        assert_eq!(c.action, Action::Reduce);
        assert_eq!(c.direction, Direction::Short);
        assert_eq!(c.quantity_delta, 6.0);
    }

    #[test]
    fn add_on_short() {
        let prev = snapshot(&[("m", &[("ETH", record(-4.0, 5))])]);
        let cur = snapshot(&[("m", &[("ETH", record(-10.0, 5))])]);

        let intents = detect(&prev, &cur, None);
        assert_eq!(intents.len(), 1);
        let c = intents[0].change.as_ref().unwrap();
        assert_eq!(c.action, Action::Add);
        assert_eq!(c.direction, Direction::Short);
        assert_eq!(c.quantity_delta, 6.0);
        assert_eq!((c.quantity_before, c.quantity_after), (-4.0, -10.0));
        assert!(intents[0].summary.contains("add SHORT 6"));
    }

    #[test]
    fn sign_flip_closes_then_opens() {
        let prev = snapshot(&[("m", &[("BTC", record(3.0, 5))])]);
        let mut short = record(-2.0, 10);
        short.exit_plan = ExitPlan { profit_target: Some(80.0), stop_loss: Some(110.0) };
        let cur = snapshot(&[("m", &[("BTC", short)])]);

        let intents = detect(&prev, &cur, None);
        assert_eq!(intents.len(), 2);

        assert_eq!(intents[0].kind, IntentKind::PositionClosed);
        let close = intents[0].change.as_ref().unwrap();
        assert_eq!(close.action, Action::Close);
        assert_eq!(close.direction, Direction::Long);
        assert_eq!(close.quantity_delta, 3.0);

        assert_eq!(intents[1].kind, IntentKind::PositionOpened);
        let open = intents[1].change.as_ref().unwrap();
        assert_eq!(open.action, Action::Open);
        assert_eq!(open.direction, Direction::Short);
        assert_eq!(open.quantity_delta, 2.0);
        assert_eq!(open.leverage_after, Some(10));
        assert_eq!((open.take_profit, open.stop_loss), (Some(80.0), Some(110.0)));
    }

    #[test]
    fn unchanged_position_emits_nothing() {
        let mut moved = record(10.0, 5);
        moved.current_price = 250.0;
        let prev = snapshot(&[("m", &[("BTC", record(10.0, 5))])]);
        let cur = snapshot(&[("m", &[("BTC", moved)])]);
        assert!(detect(&prev, &cur, None).is_empty());
    }

    #[test]
    fn leverage_only_change() {
        let prev = snapshot(&[("m", &[("BTC", record(10.0, 5))])]);
        let cur = snapshot(&[("m", &[("BTC", record(10.0, 20))])]);

        let intents = detect(&prev, &cur, None);
        let c = intents[0].change.as_ref().unwrap();
        assert_eq!(c.action, Action::LeverageOnly);
        assert_eq!(c.quantity_delta, 0.0);
        assert_eq!((c.leverage_before, c.leverage_after), (Some(5), Some(20)));
    }

    #[test]
    fn open_copies_targets_and_missing_stays_unset() {
        let mut r = record(-2.0, 3);
        r.exit_plan.profit_target = None;
        let prev = snapshot(&[("m", &[])]);
        let cur = snapshot(&[("m", &[("SOL", r)])]);

        let intents = detect(&prev, &cur, None);
        let c = intents[0].change.as_ref().unwrap();
        assert_eq!(intents[0].kind, IntentKind::PositionOpened);
        assert_eq!(c.direction, Direction::Short);
        assert_eq!(c.take_profit, None);
        assert_eq!(c.stop_loss, Some(90.0));
        assert!(intents[0].summary.contains("TP N/A"));
    }

    #[test]
    fn open_and_close_are_symmetric() {
        let empty = snapshot(&[("m", &[])]);
        let held = snapshot(&[("m", &[("BTC", record(-3.5, 5))])]);

        let opened = detect(&empty, &held, None);
        let closed = detect(&held, &empty, None);

        let o = opened[0].change.as_ref().unwrap();
        let c = closed[0].change.as_ref().unwrap();
        assert_eq!(closed[0].kind, IntentKind::PositionClosed);
        assert_eq!(o.direction, c.direction);
        assert_eq!(o.quantity_delta, c.quantity_delta);
    }

    #[test]
    fn model_added_and_removed() {
        let prev = snapshot(&[("old", &[("BTC", record(1.0, 1))])]);
        let cur = snapshot(&[("new", &[("BTC", record(1.0, 1))])]);

        let kinds: Vec<_> = detect(&prev, &cur, None).into_iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IntentKind::ModelAdded, IntentKind::ModelRemoved]);
    }

    #[test]
    fn allow_list_restricts_models() {
        let prev = snapshot(&[("a", &[]), ("b", &[])]);
        let cur = snapshot(&[
            ("a", &[("BTC", record(1.0, 1))]),
            ("b", &[("BTC", record(1.0, 1))]),
        ]);
        let allowed: HashSet<String> = ["b".to_string()].into_iter().collect();

        let intents = detect(&prev, &cur, Some(&allowed));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].model_id, "b");
    }

    #[test]
    fn deterministic_and_ordered() {
        let prev = snapshot(&[
            ("zeta", &[("XRP", record(1.0, 1))]),
            ("alpha", &[("ETH", record(2.0, 1)), ("BTC", record(1.0, 1))]),
        ]);
        let cur = snapshot(&[
            ("alpha", &[("BTC", record(3.0, 1)), ("DOGE", record(-5.0, 2))]),
            ("zeta", &[]),
        ]);

        let at = Utc::now();
        let first = detect_at(&prev, &cur, None, at);
        let second = detect_at(&prev, &cur, None, at);
        assert_eq!(first, second);

        let order: Vec<_> = first
            .iter()
            .map(|i| (i.model_id.as_str(), i.symbol().unwrap_or("")))
            .collect();
        assert_eq!(
            order,
            vec![("alpha", "BTC"), ("alpha", "DOGE"), ("alpha", "ETH"), ("zeta", "XRP")]
        );
    }

    #[test]
    fn flat_record_counts_as_absent() {
        let prev = snapshot(&[("m", &[("BTC", record(0.0, 5))])]);
        let cur = snapshot(&[("m", &[("BTC", record(2.0, 5))])]);
        let intents = detect(&prev, &cur, None);
        assert_eq!(intents[0].kind, IntentKind::PositionOpened);
        assert_eq!(intents[0].direction(), Some(Direction::Long));
    }
}
