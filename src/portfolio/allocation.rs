use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::positions::Position;
use crate::ledger::AssetType;

/// Share of the portfolio held in one instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingAllocation {
    pub instrument_key: String,
    pub asset_type: AssetType,
    pub current_value: Decimal,
    pub allocation_percent: Decimal,
}

/// Share of the portfolio held in one asset class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAllocation {
    pub asset_type: AssetType,
    pub current_value: Decimal,
    pub allocation_percent: Decimal,
    /// Number of held instruments in this class
    pub instruments: usize,
}

/// Portfolio allocation at instrument and asset-class level
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationView {
    /// Current holdings only, in position order
    pub holdings: Vec<HoldingAllocation>,
    /// Classes with at least one holding, in enumeration order
    pub asset_classes: Vec<ClassAllocation>,
    pub total_portfolio_value: Decimal,
}

impl AllocationView {
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn class(&self, asset_type: AssetType) -> Option<&ClassAllocation> {
        self.asset_classes
            .iter()
            .find(|c| c.asset_type == asset_type)
    }

    /// Value held in `asset_type`, zero when absent
    pub fn class_value(&self, asset_type: AssetType) -> Decimal {
        self.class(asset_type)
            .map_or(Decimal::ZERO, |c| c.current_value)
    }

    pub fn holdings_in(&self, asset_type: AssetType) -> impl Iterator<Item = &HoldingAllocation> {
        self.holdings
            .iter()
            .filter(move |h| h.asset_type == asset_type)
    }
}

/// Calculate instrument and asset-class allocation
///
/// Value is taken at cost basis (`total_quantity * average_cost`). Positions
/// that are not current holdings are ignored, and so is a holding whose value
/// would push the portfolio or class total past what a `Decimal` can hold.
pub fn allocate(positions: &[Position]) -> AllocationView {
    let mut total = Decimal::ZERO;
    let mut by_class: BTreeMap<AssetType, (Decimal, usize)> = BTreeMap::new();
    let mut held: Vec<(&Position, Decimal)> = Vec::new();

    for position in positions.iter().filter(|p| p.is_current_holding()) {
        let value = position.current_value();
        let class_value = by_class
            .get(&position.asset_type)
            .map_or(Decimal::ZERO, |(v, _)| *v);
        let (Some(new_total), Some(new_class_value)) =
            (total.checked_add(value), class_value.checked_add(value))
        else {
            warn!(
                "{}: value {} overflows the portfolio total, left out of allocation",
                position.instrument_key, value
            );
            continue;
        };

        total = new_total;
        let entry = by_class
            .entry(position.asset_type)
            .or_insert((Decimal::ZERO, 0));
        entry.0 = new_class_value;
        entry.1 += 1;
        held.push((position, value));
    }

    let holdings = held
        .iter()
        .map(|(position, value)| HoldingAllocation {
            instrument_key: position.instrument_key.clone(),
            asset_type: position.asset_type,
            current_value: *value,
            allocation_percent: percent_of(*value, total),
        })
        .collect();

    let asset_classes = by_class
        .into_iter()
        .map(|(asset_type, (value, instruments))| ClassAllocation {
            asset_type,
            current_value: value,
            allocation_percent: percent_of(value, total),
            instruments,
        })
        .collect();

    AllocationView {
        holdings,
        asset_classes,
        total_portfolio_value: total,
    }
}

fn percent_of(value: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    // A negative cost basis next to a tiny total can leave the range
    value
        .checked_div(total)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}
