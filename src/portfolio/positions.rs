use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::ledger::validation::validate_operation;
use crate::ledger::{AssetType, Operation, OperationType};

/// Net holding of one instrument, derived from its operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_key: String,
    pub asset_type: AssetType,
    pub total_quantity: Decimal,
    pub total_invested: Decimal,
    /// `None` unless `total_quantity > 0`
    pub average_cost: Option<Decimal>,
    /// Contributing operations in ledger order
    pub operations: Vec<Operation>,
}

impl Position {
    pub fn is_current_holding(&self) -> bool {
        self.total_quantity > Decimal::ZERO
    }

    pub fn buy_lots(&self) -> impl Iterator<Item = &Operation> {
        self.operations
            .iter()
            .filter(|op| op.operation_type == OperationType::Buy)
    }

    pub fn buy_lot_count(&self) -> usize {
        self.buy_lots().count()
    }

    /// Value approximated at cost basis (no market price feed)
    ///
    /// Equal to `total_quantity * average_cost`, taken from the invested
    /// amount so no division remainder leaks into allocation.
    pub fn current_value(&self) -> Decimal {
        if self.is_current_holding() {
            self.total_invested
        } else {
            Decimal::ZERO
        }
    }
}

/// Non-fatal finding produced while aggregating a ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Operation failed validation and was left out
    InvalidOperation {
        index: usize,
        instrument_key: String,
        error: ValidationError,
    },
    /// Sells exceed buys; the position is kept for audit only
    Oversold {
        instrument_key: String,
        total_quantity: Decimal,
    },
    /// Operations of one instrument disagree on the asset class
    AssetTypeMismatch {
        instrument_key: String,
        kept: AssetType,
        found: AssetType,
    },
    /// Running totals no longer fit in a `Decimal`
    ///
    /// With an `index`, that operation was left out; without one, the
    /// average cost could not be represented.
    TotalsOverflow {
        index: Option<usize>,
        instrument_key: String,
    },
}

impl Anomaly {
    pub fn instrument_key(&self) -> &str {
        match self {
            Anomaly::InvalidOperation { instrument_key, .. }
            | Anomaly::Oversold { instrument_key, .. }
            | Anomaly::AssetTypeMismatch { instrument_key, .. }
            | Anomaly::TotalsOverflow { instrument_key, .. } => instrument_key,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::InvalidOperation {
                index,
                instrument_key,
                error,
            } => write!(
                f,
                "operation #{} ({}) skipped: {}",
                index + 1,
                instrument_key,
                error
            ),
            Anomaly::Oversold {
                instrument_key,
                total_quantity,
            } => write!(
                f,
                "{}: sells exceed purchases, net quantity {}",
                instrument_key, total_quantity
            ),
            Anomaly::AssetTypeMismatch {
                instrument_key,
                kept,
                found,
            } => write!(
                f,
                "{}: mixed asset classes, using {} (also found {})",
                instrument_key, kept, found
            ),
            Anomaly::TotalsOverflow {
                index: Some(index),
                instrument_key,
            } => write!(
                f,
                "operation #{} ({}) skipped: position totals overflow",
                index + 1,
                instrument_key
            ),
            Anomaly::TotalsOverflow {
                index: None,
                instrument_key,
            } => write!(f, "{}: average cost is too large to represent", instrument_key),
        }
    }
}

/// Positions plus the anomalies found while building them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    /// Every instrument seen, sorted by instrument key
    pub positions: Vec<Position>,
    pub anomalies: Vec<Anomaly>,
}

impl Aggregation {
    pub fn current_holdings(&self) -> Vec<&Position> {
        current_holdings(&self.positions)
    }

    pub fn position(&self, instrument_key: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.instrument_key == instrument_key)
    }
}

/// Running totals for a single instrument
#[derive(Debug, Default)]
struct PositionAccumulator {
    quantity: Decimal,
    invested: Decimal,
    asset_types: BTreeSet<AssetType>,
    operations: Vec<Operation>,
}

impl PositionAccumulator {
    /// Fold one operation in; `None` (and no change) when a total overflows
    fn add(&mut self, op: &Operation) -> Option<()> {
        let (quantity, invested) = match op.operation_type {
            OperationType::Buy => (
                self.quantity.checked_add(op.quantity)?,
                self.invested.checked_add(op.total_value)?,
            ),
            OperationType::Sell => (
                self.quantity.checked_sub(op.quantity)?,
                self.invested.checked_sub(op.total_value)?,
            ),
        };
        self.quantity = quantity;
        self.invested = invested;
        self.asset_types.insert(op.asset_type);
        self.operations.push(op.clone());
        Some(())
    }

    fn finish(self, instrument_key: &str, anomalies: &mut Vec<Anomaly>) -> Position {
        // Smallest asset class wins so the result does not depend on ledger order
        let mut asset_types = self.asset_types.iter().copied();
        let asset_type = asset_types.next().unwrap_or(AssetType::Other);
        for found in asset_types {
            anomalies.push(Anomaly::AssetTypeMismatch {
                instrument_key: instrument_key.to_string(),
                kept: asset_type,
                found,
            });
        }

        if self.quantity < Decimal::ZERO {
            warn!(
                "{}: sells exceed purchases (net quantity {}), excluded from holdings",
                instrument_key, self.quantity
            );
            anomalies.push(Anomaly::Oversold {
                instrument_key: instrument_key.to_string(),
                total_quantity: self.quantity,
            });
        }

        let average_cost = if self.quantity > Decimal::ZERO {
            let average = self.invested.checked_div(self.quantity);
            if average.is_none() {
                warn!("{}: average cost overflows", instrument_key);
                anomalies.push(Anomaly::TotalsOverflow {
                    index: None,
                    instrument_key: instrument_key.to_string(),
                });
            }
            average
        } else {
            None
        };

        Position {
            instrument_key: instrument_key.to_string(),
            asset_type,
            total_quantity: self.quantity,
            total_invested: self.invested,
            average_cost,
            operations: self.operations,
        }
    }
}

/// Fold ledger operations into per-instrument positions
///
/// Invalid operations are skipped and reported; they never stop the rest of
/// the batch. Oversold instruments are still returned, flagged as anomalies.
pub fn aggregate(operations: &[Operation]) -> Aggregation {
    let mut groups: BTreeMap<&str, PositionAccumulator> = BTreeMap::new();
    let mut anomalies = Vec::new();

    for (index, op) in operations.iter().enumerate() {
        if let Err(error) = validate_operation(op) {
            debug!(
                "Skipping operation #{} ({}): {}",
                index + 1,
                op.instrument_key,
                error
            );
            anomalies.push(Anomaly::InvalidOperation {
                index,
                instrument_key: op.instrument_key.clone(),
                error,
            });
            continue;
        }

        let accumulated = groups
            .entry(op.instrument_key.as_str())
            .or_default()
            .add(op);
        if accumulated.is_none() {
            warn!(
                "Skipping operation #{} ({}): position totals overflow",
                index + 1,
                op.instrument_key
            );
            anomalies.push(Anomaly::TotalsOverflow {
                index: Some(index),
                instrument_key: op.instrument_key.clone(),
            });
        }
    }

    let positions: Vec<Position> = groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key, &mut anomalies))
        .collect();

    info!(
        "Aggregated {} operation(s) into {} position(s), {} anomaly(ies)",
        operations.len(),
        positions.len(),
        anomalies.len()
    );

    Aggregation {
        positions,
        anomalies,
    }
}

/// Positions with a positive net quantity
pub fn current_holdings(positions: &[Position]) -> Vec<&Position> {
    positions.iter().filter(|p| p.is_current_holding()).collect()
}
