//! Money validation and rounding helpers for prices, invoice totals and conversions
//!
//! All monetary arithmetic uses BigDecimal. Amounts are rounded with HALF_EVEN
//! (banker's rounding) to the minor unit of their currency.

use bigdecimal::{BigDecimal, RoundingMode, Signed, Zero};
use crate::error::AppError;

/// Precision kept for exchange rates and intermediate conversion results
pub const RATE_DECIMAL_PLACES: i64 = 6;

/// Currencies invoiced without a fractional part
const ZERO_DECIMAL_INVOICE_CURRENCIES: [&str; 2] = ["HUF", "JPY"];

/// Number of decimal places used on invoices for `currency`
pub fn currency_scale(currency: &str) -> i64 {
    let upper = currency.to_uppercase();
    if ZERO_DECIMAL_INVOICE_CURRENCIES.contains(&upper.as_str()) {
        0
    } else {
        2
    }
}

/// Rounds an amount to the minor unit of `currency` using HALF_EVEN rounding
pub fn round_money(amount: &BigDecimal, currency: &str) -> BigDecimal {
    amount.with_scale_round(currency_scale(currency), RoundingMode::HalfEven)
}

/// Normalizes an exchange rate to the stored precision
pub fn normalize_rate(rate: &BigDecimal) -> BigDecimal {
    rate.with_scale_round(RATE_DECIMAL_PLACES, RoundingMode::HalfEven)
}

/// Validates an ISO 4217 currency code and returns it uppercased
pub fn validate_currency_code(currency: &str) -> Result<String, AppError> {
    let upper = currency.trim().to_uppercase();
    if upper.len() != 3 || !upper.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(format!("Invalid currency code: '{}'", currency)));
    }
    Ok(upper)
}

/// Validates that a price is non-negative and has no more precision than its currency allows
///
/// # Arguments
/// * `amount` - The amount to validate
/// * `currency` - Currency the amount is denominated in
/// * `operation_name` - Description of the operation for error messages
pub fn validate_price(amount: &BigDecimal, currency: &str, operation_name: &str) -> Result<(), AppError> {
    if amount.is_negative() {
        return Err(AppError::Validation(
            format!("{} amount cannot be negative: {}", operation_name, amount)
        ));
    }

    if amount != &round_money(amount, currency) {
        return Err(AppError::Validation(
            format!("{} amount {} has more decimal places than {} allows ({})",
                operation_name, amount, currency, currency_scale(currency))
        ));
    }

    Ok(())
}

/// Validates a conversion amount (must be non-negative)
pub fn validate_conversion_amount(amount: &BigDecimal) -> Result<(), AppError> {
    if amount.is_negative() {
        return Err(AppError::Validation(format!("Amount cannot be negative: {}", amount)));
    }
    Ok(())
}

/// Validates an exchange rate (must be strictly positive)
pub fn validate_rate(currency: &str, rate: &BigDecimal) -> Result<(), AppError> {
    if rate.is_zero() || rate.is_negative() {
        return Err(AppError::Validation(
            format!("Exchange rate for {} must be positive: {}", currency, rate)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_forint_and_yen_round_to_whole_units() {
        assert_eq!(currency_scale("HUF"), 0);
        assert_eq!(currency_scale("jpy"), 0);
        assert_eq!(currency_scale("EUR"), 2);
        assert_eq!(round_money(&BigDecimal::from_str("1234.5").unwrap(), "HUF"), BigDecimal::from(1234));
        assert_eq!(round_money(&BigDecimal::from_str("1235.5").unwrap(), "HUF"), BigDecimal::from(1236));
    }

    #[test]
    fn test_round_money_is_half_even() {
        assert_eq!(
            round_money(&BigDecimal::from_str("10.125").unwrap(), "EUR"),
            BigDecimal::from_str("10.12").unwrap()
        );
        assert_eq!(
            round_money(&BigDecimal::from_str("10.135").unwrap(), "EUR"),
            BigDecimal::from_str("10.14").unwrap()
        );
    }

    #[test]
    fn test_validate_price_valid() {
        let amount = BigDecimal::from_str("12500").unwrap();
        assert!(validate_price(&amount, "HUF", "Test").is_ok());
        let amount = BigDecimal::from_str("39.90").unwrap();
        assert!(validate_price(&amount, "EUR", "Test").is_ok());
    }

    #[test]
    fn test_validate_price_negative() {
        let amount = BigDecimal::from_str("-10.00").unwrap();
        assert!(validate_price(&amount, "EUR", "Test").is_err());
    }

    #[test]
    fn test_validate_price_too_many_decimals() {
        let amount = BigDecimal::from_str("100.5").unwrap();
        assert!(validate_price(&amount, "HUF", "Test").is_err());
        let amount = BigDecimal::from_str("10.123").unwrap();
        assert!(validate_price(&amount, "EUR", "Test").is_err());
    }

    #[test]
    fn test_validate_currency_code() {
        assert_eq!(validate_currency_code(" eur ").unwrap(), "EUR");
        assert!(validate_currency_code("EURO").is_err());
        assert!(validate_currency_code("E1R").is_err());
    }

    #[test]
    fn test_validate_rate_rejects_zero() {
        assert!(validate_rate("EUR", &BigDecimal::zero()).is_err());
        assert!(validate_rate("EUR", &BigDecimal::from_str("395.12").unwrap()).is_ok());
    }
}
