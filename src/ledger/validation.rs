//! Operation validation
//!
//! Checks the basic shape of a ledger entry before it takes part in any
//! calculation. Callers collect failures instead of stopping on the first one.

use rust_decimal::Decimal;

use super::models::{Operation, EPSILON};
use crate::error::ValidationError;

/// Validate a single operation
///
/// Checks, in order: non-empty instrument key, positive quantity, positive
/// unit price, non-negative fees, a derived total that fits in a `Decimal`,
/// and a stored total that matches it within `EPSILON`.
pub fn validate_operation(op: &Operation) -> Result<(), ValidationError> {
    if op.instrument_key.trim().is_empty() {
        return Err(ValidationError::EmptyInstrumentKey);
    }

    if op.quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity(op.quantity));
    }

    if op.unit_price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice(op.unit_price));
    }

    if op.fees < Decimal::ZERO {
        return Err(ValidationError::NegativeFees(op.fees));
    }

    let expected = op.expected_total().ok_or(ValidationError::ValueOverflow {
        quantity: op.quantity,
        unit_price: op.unit_price,
    })?;
    let mismatch = op
        .total_value
        .checked_sub(expected)
        .map_or(true, |diff| diff.abs() >= EPSILON);
    if mismatch {
        return Err(ValidationError::TotalValueMismatch {
            stored: op.total_value,
            expected,
        });
    }

    Ok(())
}

/// Validate a batch, returning every failure with its input index
pub fn collect_issues(operations: &[Operation]) -> Vec<(usize, ValidationError)> {
    operations
        .iter()
        .enumerate()
        .filter_map(|(idx, op)| validate_operation(op).err().map(|e| (idx, e)))
        .collect()
}
