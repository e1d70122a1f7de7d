//! Carteira - investment position and rebalancing engine
//!
//! Folds a ledger of buy/sell operations into positions, merges duplicate
//! buy lots at weighted-average cost, computes allocation per instrument and
//! asset class, and suggests rebalancing actions against a target allocation.

pub mod config;
pub mod error;
pub mod importers;
pub mod ledger;
pub mod portfolio;
pub mod service;
