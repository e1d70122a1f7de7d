//! Duplicate lot detection and weighted-average consolidation
//!
//! Several buy lots of one instrument can be folded into a single synthetic
//! lot. Quantity and invested capital are conserved; only the cost basis
//! distribution across lots changes. Sells are never touched.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::positions::Position;
use crate::ledger::validation::validate_operation;
use crate::ledger::{checked_sum, Lineage, Operation, OperationType};

/// Keys of instruments holding more than one buy lot
pub fn find_consolidatable(positions: &[Position]) -> Vec<String> {
    positions
        .iter()
        .filter(|p| p.buy_lot_count() > 1)
        .map(|p| p.instrument_key.clone())
        .collect()
}

/// Synthetic lot replacing several buy lots of one instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedLot {
    pub operation: Operation,
    /// Store ids of the lots being replaced (lots without id are omitted)
    pub replaced_ids: Vec<i64>,
}

impl ConsolidatedLot {
    pub fn lineage(&self) -> Option<&Lineage> {
        self.operation.lineage.as_ref()
    }

    /// Full replacement set for the instrument
    ///
    /// Every operation of the instrument that was not merged (sells, and
    /// rows that failed validation) is kept in ledger order, followed by the
    /// synthetic buy lot.
    pub fn ledger_entries(&self, operations: &[Operation]) -> Vec<Operation> {
        let key = self.operation.instrument_key.as_str();
        operations
            .iter()
            .filter(|op| op.instrument_key == key && !is_mergeable_lot(op, key))
            .cloned()
            .chain(std::iter::once(self.operation.clone()))
            .collect()
    }
}

/// Outcome of a consolidation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Consolidation {
    Merged(ConsolidatedLot),
    /// Fewer than two buy lots, or merged totals that would not fit in a
    /// `Decimal`; nothing to change
    NoOp,
}

impl Consolidation {
    pub fn is_noop(&self) -> bool {
        matches!(self, Consolidation::NoOp)
    }

    pub fn merged(&self) -> Option<&ConsolidatedLot> {
        match self {
            Consolidation::Merged(lot) => Some(lot),
            Consolidation::NoOp => None,
        }
    }
}

fn is_mergeable_lot(op: &Operation, instrument_key: &str) -> bool {
    op.instrument_key == instrument_key
        && op.operation_type == OperationType::Buy
        && validate_operation(op).is_ok()
}

/// Merge the buy lots of `instrument_key` into one weighted-average lot
///
/// Returns `NoOp` when fewer than two valid buy lots exist, which makes
/// consolidating an already consolidated instrument a no-op.
pub fn consolidate(instrument_key: &str, operations: &[Operation]) -> Consolidation {
    let lots: Vec<&Operation> = operations
        .iter()
        .filter(|op| is_mergeable_lot(op, instrument_key))
        .collect();

    if lots.len() < 2 {
        debug!(
            "{}: {} buy lot(s), nothing to consolidate",
            instrument_key,
            lots.len()
        );
        return Consolidation::NoOp;
    }

    // Earlier consolidations contribute their own lineage
    let totals = checked_sum(lots.iter().map(|op| op.quantity)).and_then(|quantity| {
        let total_value = checked_sum(lots.iter().map(|op| op.total_value))?;
        let fees_carried = lots.iter().try_fold(Decimal::ZERO, |acc, op| {
            let carried = op.lineage.as_ref().map_or(Decimal::ZERO, |l| l.fees_carried);
            acc.checked_add(op.fees)?.checked_add(carried)
        })?;
        let unit_price = total_value.checked_div(quantity)?;
        Some((quantity, total_value, fees_carried, unit_price))
    });
    let Some((quantity, total_value, fees_carried, unit_price)) = totals else {
        warn!(
            "{}: merged totals of {} lot(s) overflow, leaving lots as they are",
            instrument_key,
            lots.len()
        );
        return Consolidation::NoOp;
    };
    // Same rule as aggregation, so merging never moves value between classes
    let asset_type = lots
        .iter()
        .map(|op| op.asset_type)
        .min()
        .unwrap_or(lots[0].asset_type);
    let merged_lots: usize = lots
        .iter()
        .map(|op| op.lineage.as_ref().map_or(1, |l| l.merged_lots))
        .sum();
    let first_purchase = lots
        .iter()
        .map(|op| op.lineage.as_ref().map_or(op.date, |l| l.first_purchase))
        .min()
        .unwrap_or(lots[0].date);
    let last_purchase = lots
        .iter()
        .map(|op| op.lineage.as_ref().map_or(op.date, |l| l.last_purchase))
        .max()
        .unwrap_or(lots[0].date);

    let operation = Operation {
        id: None,
        instrument_key: instrument_key.to_string(),
        operation_type: OperationType::Buy,
        asset_type,
        date: first_purchase,
        quantity,
        unit_price,
        // Fees are already inside total_value and recorded in the lineage
        fees: Decimal::ZERO,
        total_value,
        notes: Some(format!(
            "Consolidated {} lots ({} to {})",
            merged_lots, first_purchase, last_purchase
        )),
        lineage: Some(Lineage {
            first_purchase,
            last_purchase,
            merged_lots,
            fees_carried,
        }),
    };

    debug!(
        "{}: merged {} lot(s) into {} @ {}",
        instrument_key,
        lots.len(),
        quantity,
        unit_price
    );

    Consolidation::Merged(ConsolidatedLot {
        operation,
        replaced_ids: lots.iter().filter_map(|op| op.id).collect(),
    })
}
