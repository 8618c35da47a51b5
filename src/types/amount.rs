//! Fixed-point amount validation
//!
//! Ledger amounts carry exactly two fractional digits. Inputs are checked once
//! at the edge of every mutating operation and rescaled so that everything
//! stored and published has the same scale.

use super::error::LedgerError;
use rust_decimal::Decimal;

/// Number of fractional digits every stored amount carries
pub const AMOUNT_SCALE: u32 = 2;

/// Validate a caller-supplied amount and rescale it to [`AMOUNT_SCALE`]
///
/// # Errors
///
/// `LedgerError::Validation` if the amount is zero, negative, has more than
/// two significant fractional digits (trailing zeros are fine: `1.500` is `1.50`),
/// or is too large to be stored with two fractional digits.
pub fn normalize_amount(amount: Decimal, field: &str) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "{} must be greater than 0, got {}",
            field, amount
        )));
    }

    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::validation(format!(
            "{} {} has more than {} fractional digits",
            field, amount, AMOUNT_SCALE
        )));
    }

    // rescale keeps a smaller scale when the mantissa has no room left
    let mut normalized = amount;
    normalized.rescale(AMOUNT_SCALE);
    if normalized.scale() != AMOUNT_SCALE {
        return Err(LedgerError::validation(format!(
            "{} {} is too large to carry {} fractional digits",
            field, amount, AMOUNT_SCALE
        )));
    }

    Ok(normalized)
}
