//! Fixed-point credit amounts.
//!
//! Every balance, stake and reward is an [`Amount`]. Arithmetic on amounts
//! goes through the checked helpers below so an overflow surfaces as
//! [`LedgerError::AmountOverflow`] instead of a panic or a silent wrap.

use crate::error::{LedgerError, Result};
use fixed::types::I32F32;

/// Deterministic fixed-point credit unit.
pub type Amount = I32F32;

pub const ZERO: Amount = I32F32::ZERO;

/// Build an amount from a float, rejecting NaN, infinities and out-of-range values.
pub fn amount_from_f64(value: f64) -> Result<Amount> {
    if !value.is_finite() {
        return Err(LedgerError::InvalidAmount(format!("{} is not finite", value)));
    }
    Amount::checked_from_num(value)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} does not fit a credit amount", value)))
}

/// Parse a decimal string such as `"12.5"` into an amount.
pub fn parse_amount(s: &str) -> Result<Amount> {
    let amount: Amount = s
        .trim()
        .parse()
        .map_err(|e| LedgerError::InvalidAmount(format!("'{}': {}", s, e)))?;
    ensure_non_negative(amount)?;
    Ok(amount)
}

pub fn ensure_non_negative(amount: Amount) -> Result<()> {
    if amount < ZERO {
        return Err(LedgerError::InvalidAmount(format!("{} is negative", amount)));
    }
    Ok(())
}

/// Operations on the ledger move strictly positive quantities.
pub fn ensure_positive(amount: Amount) -> Result<()> {
    if amount <= ZERO {
        return Err(LedgerError::InvalidAmount(format!("{} must be greater than zero", amount)));
    }
    Ok(())
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} + {}", a, b)))
}

pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} - {}", a, b)))
}

pub fn checked_mul(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_mul(b)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} * {}", a, b)))
}

pub fn checked_div(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_div(b)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} / {}", a, b)))
}

/// Sum an iterator of amounts, failing on overflow.
pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Result<Amount> {
    amounts.into_iter().try_fold(ZERO, checked_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.5").unwrap(), Amount::from_num(12.5));
        assert_eq!(parse_amount(" 100 ").unwrap(), Amount::from_num(100));
        assert!(matches!(parse_amount("-1"), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(parse_amount("abc"), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let result = checked_add(Amount::MAX, Amount::from_num(1));
        assert!(matches!(result, Err(LedgerError::AmountOverflow(_))));
        assert!(amount_from_f64(f64::NAN).is_err());
        assert!(amount_from_f64(1e30).is_err());
    }

    #[test]
    fn test_checked_sum() {
        let total = checked_sum(vec![Amount::from_num(1.5), Amount::from_num(2.5)]).unwrap();
        assert_eq!(total, Amount::from_num(4));
    }
}
