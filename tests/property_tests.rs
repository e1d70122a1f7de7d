//! Property-based tests for the engine pipeline
//!
//! Generated ledgers are pushed through aggregation, consolidation,
//! allocation and rebalancing, checking the properties every ledger must
//! satisfy rather than hand-picked numbers.

use carteira::config::AllocationTarget;
use carteira::ledger::{AssetType, Operation, OperationType, EPSILON};
use carteira::portfolio::{
    aggregate, allocate, consolidate, rebalance, Action, Position, Priority,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Generators
// =============================================================================

fn arb_asset_type() -> impl Strategy<Value = AssetType> {
    proptest::sample::select(AssetType::ALL.to_vec())
}

/// Few keys so instruments collect several lots
fn arb_instrument() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(vec!["PETR4", "VALE3", "HGLG11", "KNRI11", "BTC"])
}

/// A valid buy or sell; buys are three times as likely as sells
fn arb_operation() -> impl Strategy<Value = Operation> {
    (
        arb_instrument(),
        arb_asset_type(),
        prop_oneof![3 => Just(OperationType::Buy), 1 => Just(OperationType::Sell)],
        1u32..=28,
        1i64..100_000,     // quantity in hundredths
        1i64..5_000_000,   // unit price in cents
        0i64..1_000,       // fees in cents
    )
        .prop_map(|(key, asset_type, operation_type, day, quantity, price, fees)| {
            Operation::new(
                key,
                operation_type,
                asset_type,
                NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                Decimal::new(quantity, 2),
                Decimal::new(price, 2),
                Decimal::new(fees, 2),
            )
        })
}

fn arb_ledger() -> impl Strategy<Value = Vec<Operation>> {
    proptest::collection::vec(arb_operation(), 0..40)
}

/// A ledger together with a shuffled copy of it
fn arb_ledger_and_shuffle() -> impl Strategy<Value = (Vec<Operation>, Vec<Operation>)> {
    arb_ledger().prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle()))
}

/// Targets for a random subset of classes, each in [0, 100]
fn arb_targets() -> impl Strategy<Value = AllocationTarget> {
    proptest::collection::vec(proptest::option::of(0i64..=100), AssetType::ALL.len()).prop_map(
        |percents| {
            let mut targets = AllocationTarget::new();
            for (asset_type, percent) in AssetType::ALL.iter().zip(percents) {
                if let Some(percent) = percent {
                    targets.set(*asset_type, Decimal::from(percent)).unwrap();
                }
            }
            targets
        },
    )
}

/// Position values without the contributing operations
fn totals(position: &Position) -> (String, AssetType, Decimal, Decimal, Option<Decimal>) {
    (
        position.instrument_key.clone(),
        position.asset_type,
        position.total_quantity,
        position.total_invested,
        position.average_cost,
    )
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Reordering the ledger never changes a position
    #[test]
    fn prop_aggregation_ignores_ledger_order((ledger, shuffled) in arb_ledger_and_shuffle()) {
        let a: Vec<_> = aggregate(&ledger).positions.iter().map(totals).collect();
        let b: Vec<_> = aggregate(&shuffled).positions.iter().map(totals).collect();
        prop_assert_eq!(a, b);
    }

    /// Quantity is buys minus sells, and average cost times quantity is the
    /// capital invested
    #[test]
    fn prop_average_cost_matches_invested(ledger in arb_ledger()) {
        let aggregation = aggregate(&ledger);
        prop_assert!(aggregation.anomalies.iter().all(|a| !matches!(
            a,
            carteira::portfolio::Anomaly::InvalidOperation { .. }
        )), "unexpected InvalidOperation anomaly");

        for position in &aggregation.positions {
            let signed: Decimal = ledger
                .iter()
                .filter(|op| op.instrument_key == position.instrument_key)
                .map(|op| match op.operation_type {
                    OperationType::Buy => op.quantity,
                    OperationType::Sell => -op.quantity,
                })
                .sum();
            prop_assert_eq!(position.total_quantity, signed);

            match position.average_cost {
                Some(average) => {
                    prop_assert!(position.is_current_holding());
                    let rebuilt = average * position.total_quantity;
                    prop_assert!((rebuilt - position.total_invested).abs() < EPSILON);
                }
                None => prop_assert!(!position.is_current_holding()),
            }
        }
    }

    /// Holding and class percentages each add up to 100
    #[test]
    fn prop_allocation_closes(ledger in arb_ledger()) {
        let view = allocate(&aggregate(&ledger).positions);

        let class_total: Decimal = view.asset_classes.iter().map(|c| c.current_value).sum();
        prop_assert_eq!(class_total, view.total_portfolio_value);

        if view.total_portfolio_value > Decimal::ZERO {
            let holdings: Decimal = view.holdings.iter().map(|h| h.allocation_percent).sum();
            let classes: Decimal = view.asset_classes.iter().map(|c| c.allocation_percent).sum();
            prop_assert!((holdings - Decimal::ONE_HUNDRED).abs() < EPSILON);
            prop_assert!((classes - Decimal::ONE_HUNDRED).abs() < EPSILON);
        } else {
            prop_assert!(view.holdings.iter().all(|h| h.allocation_percent.is_zero()));
        }
    }

    /// Merging lots keeps every position and allocation class as it was,
    /// and a second merge has nothing to do
    #[test]
    fn prop_consolidation_conserves_positions(ledger in arb_ledger()) {
        let before = aggregate(&ledger);
        let class_before = allocate(&before.positions).asset_classes;

        let mut after_ledger = ledger.clone();
        for position in &before.positions {
            let key = position.instrument_key.as_str();
            if let Some(lot) = consolidate(key, &after_ledger).merged().cloned() {
                let mut next: Vec<Operation> = after_ledger
                    .iter()
                    .filter(|op| op.instrument_key != key)
                    .cloned()
                    .collect();
                next.extend(lot.ledger_entries(&after_ledger));
                after_ledger = next;
            }
            prop_assert!(consolidate(key, &after_ledger).is_noop());
        }

        let after = aggregate(&after_ledger);
        let a: Vec<_> = before.positions.iter().map(totals).collect();
        let b: Vec<_> = after.positions.iter().map(totals).collect();
        prop_assert_eq!(a, b);
        prop_assert_eq!(allocate(&after.positions).asset_classes, class_before);
    }

    /// Actions and priorities follow the 2% / 10% / 5% bands of the base
    #[test]
    fn prop_rebalancing_follows_policy(
        ledger in arb_ledger(),
        targets in arb_targets(),
        contribution in proptest::option::of(0i64..1_000_000),
    ) {
        let view = allocate(&aggregate(&ledger).positions);
        let base = match contribution {
            Some(amount) => view.total_portfolio_value + Decimal::from(amount),
            None => view.total_portfolio_value,
        };
        let suggestions = rebalance(&view, &targets, Some(base));

        let dead_band = Decimal::new(2, 2) * base.abs();
        let high = Decimal::new(10, 2) * base.abs();
        let medium = Decimal::new(5, 2) * base.abs();

        for s in &suggestions {
            let magnitude = s.delta.abs();
            prop_assert_eq!(s.delta, s.target_value - s.current_value);

            let expected_action = if s.delta.is_zero() || magnitude < dead_band {
                Action::Hold
            } else if s.delta > Decimal::ZERO {
                Action::Buy
            } else {
                Action::Sell
            };
            prop_assert_eq!(s.action, expected_action);

            let expected_priority = if magnitude > high {
                Priority::High
            } else if magnitude > medium {
                Priority::Medium
            } else {
                Priority::Low
            };
            prop_assert_eq!(s.priority, expected_priority);
        }

        for pair in suggestions.windows(2) {
            prop_assert!(pair[0].delta.abs() >= pair[1].delta.abs());
        }
    }
}
