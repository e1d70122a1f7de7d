//! Error handling for the portfolio engine
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.
//!
//! Per-operation problems (`ValidationError`) never abort a computation;
//! they are collected as anomalies next to the results.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::ledger::AssetType;

/// Core error types for store and boundary operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Reasons a single ledger operation is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("instrument key is empty")]
    EmptyInstrumentKey,

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("unit price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("fees must not be negative, got {0}")]
    NegativeFees(Decimal),

    #[error("total value {stored} does not match derived value {expected}")]
    TotalValueMismatch { stored: Decimal, expected: Decimal },

    #[error("quantity {quantity} at {unit_price} is too large to total")]
    ValueOverflow { quantity: Decimal, unit_price: Decimal },
}

/// Problems found at the configuration boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown asset class '{0}'")]
    UnknownAssetClass(String),

    #[error("target for {asset_type} must be between 0 and 100, got {value}")]
    TargetOutOfRange { asset_type: AssetType, value: Decimal },

    #[error("policy threshold '{name}' must be between 0 and 1, got {value}")]
    InvalidPolicy { name: &'static str, value: Decimal },

    #[error("invalid configuration file: {0}")]
    Parse(String),
}

/// Result type alias for engine operations
pub type Result<T> = anyhow::Result<T>;
