use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Tolerance used when comparing derived decimal values (0.000001)
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Asset classes supported by the engine
///
/// Declaration order is the canonical enumeration order used when
/// iterating targets and asset-class allocations.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,    // Listed equities (ações)
    Fii,      // Real estate investment funds
    Treasury, // Government bonds (Tesouro Direto)
    Cdb,      // Bank certificates of deposit
    Crypto,
    Fund, // Investment funds
    Other,
}

impl AssetType {
    pub const ALL: [AssetType; 7] = [
        AssetType::Stock,
        AssetType::Fii,
        AssetType::Treasury,
        AssetType::Cdb,
        AssetType::Crypto,
        AssetType::Fund,
        AssetType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::Fii => "fii",
            AssetType::Treasury => "treasury",
            AssetType::Cdb => "cdb",
            AssetType::Crypto => "crypto",
            AssetType::Fund => "fund",
            AssetType::Other => "other",
        }
    }
}

impl FromStr for AssetType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" | "acao" | "acoes" => Ok(AssetType::Stock),
            "fii" => Ok(AssetType::Fii),
            "treasury" | "tesouro" | "tesouro_direto" => Ok(AssetType::Treasury),
            "cdb" => Ok(AssetType::Cdb),
            "crypto" => Ok(AssetType::Crypto),
            "fund" | "fundo" => Ok(AssetType::Fund),
            "other" => Ok(AssetType::Other),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation type (buy or sell)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Buy,
    Sell,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Buy => "buy",
            OperationType::Sell => "sell",
        }
    }
}

impl FromStr for OperationType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "compra" | "c" => Ok(OperationType::Buy),
            "sell" | "venda" | "v" => Ok(OperationType::Sell),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit trail carried by a synthetic lot produced by consolidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub first_purchase: NaiveDate,
    pub last_purchase: NaiveDate,
    /// Number of original lots folded into this one
    pub merged_lots: usize,
    /// Fees of the merged lots; already included in `total_value`
    pub fees_carried: Decimal,
}

/// One ledger entry (buy or sell of an instrument)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Option<i64>,
    /// Ticker, or name when the instrument has no ticker
    pub instrument_key: String,
    pub operation_type: OperationType,
    pub asset_type: AssetType,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub fees: Decimal,
    pub total_value: Decimal,
    pub notes: Option<String>,
    pub lineage: Option<Lineage>,
}

impl Operation {
    /// Build a buy with `total_value = quantity * unit_price + fees`
    pub fn buy(
        instrument_key: impl Into<String>,
        asset_type: AssetType,
        date: NaiveDate,
        quantity: Decimal,
        unit_price: Decimal,
        fees: Decimal,
    ) -> Self {
        Self::new(
            instrument_key,
            OperationType::Buy,
            asset_type,
            date,
            quantity,
            unit_price,
            fees,
        )
    }

    /// Build a sell with `total_value = quantity * unit_price - fees` (net proceeds)
    pub fn sell(
        instrument_key: impl Into<String>,
        asset_type: AssetType,
        date: NaiveDate,
        quantity: Decimal,
        unit_price: Decimal,
        fees: Decimal,
    ) -> Self {
        Self::new(
            instrument_key,
            OperationType::Sell,
            asset_type,
            date,
            quantity,
            unit_price,
            fees,
        )
    }

    /// Build an operation with its derived total
    ///
    /// A total that does not fit in a `Decimal` saturates at `Decimal::MAX`;
    /// validation rejects such an operation. Use [`Operation::try_new`] to
    /// reject it up front.
    pub fn new(
        instrument_key: impl Into<String>,
        operation_type: OperationType,
        asset_type: AssetType,
        date: NaiveDate,
        quantity: Decimal,
        unit_price: Decimal,
        fees: Decimal,
    ) -> Self {
        let total_value =
            derived_total(operation_type, quantity, unit_price, fees).unwrap_or(Decimal::MAX);
        Self {
            id: None,
            instrument_key: instrument_key.into(),
            operation_type,
            asset_type,
            date,
            quantity,
            unit_price,
            fees,
            total_value,
            notes: None,
            lineage: None,
        }
    }

    /// Like [`Operation::new`], failing when the total overflows
    pub fn try_new(
        instrument_key: impl Into<String>,
        operation_type: OperationType,
        asset_type: AssetType,
        date: NaiveDate,
        quantity: Decimal,
        unit_price: Decimal,
        fees: Decimal,
    ) -> Result<Self, ValidationError> {
        if derived_total(operation_type, quantity, unit_price, fees).is_none() {
            return Err(ValidationError::ValueOverflow {
                quantity,
                unit_price,
            });
        }
        Ok(Self::new(
            instrument_key,
            operation_type,
            asset_type,
            date,
            quantity,
            unit_price,
            fees,
        ))
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_buy(&self) -> bool {
        self.operation_type == OperationType::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.operation_type == OperationType::Sell
    }

    /// Total value implied by quantity, price and fees (`None` on overflow)
    pub fn expected_total(&self) -> Option<Decimal> {
        derived_total(
            self.operation_type,
            self.quantity,
            self.unit_price,
            self.fees,
        )
    }
}

/// Derive the total value of an operation from its components
///
/// `None` when the result does not fit in a `Decimal`.
pub fn derived_total(
    operation_type: OperationType,
    quantity: Decimal,
    unit_price: Decimal,
    fees: Decimal,
) -> Option<Decimal> {
    let gross = quantity.checked_mul(unit_price)?;
    match operation_type {
        OperationType::Buy => gross.checked_add(fees),
        OperationType::Sell => gross.checked_sub(fees),
    }
}

/// Sum of decimals, `None` on overflow
pub fn checked_sum<I: IntoIterator<Item = Decimal>>(values: I) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
}
