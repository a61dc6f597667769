use bigdecimal::{BigDecimal, Signed, ToPrimitive};
use crate::error::AppError;

/// Utilities for handling money precision between the Stripe API and internal BigDecimal amounts
///
/// Stripe API requirements:
/// - All amounts are in the currency's smallest unit
/// - Zero-decimal currencies (JPY, KRW) don't multiply by 100
/// - HUF is a two-decimal currency for Stripe even though invoices round it to whole forints

/// Convert Stripe amount (in smallest unit) to BigDecimal
pub fn stripe_cents_to_decimal(stripe_amount_cents: i64, currency: &str) -> Result<BigDecimal, AppError> {
    if currency.is_empty() {
        return Err(AppError::Validation("Currency code cannot be empty".to_string()));
    }

    let amount = BigDecimal::from(stripe_amount_cents);

    if is_zero_decimal_currency(currency) {
        Ok(amount)
    } else {
        Ok(amount / BigDecimal::from(100))
    }
}

/// Convert BigDecimal amount to Stripe's smallest currency unit
pub fn decimal_to_stripe_cents(amount: &BigDecimal, currency: &str) -> Result<i64, AppError> {
    if currency.is_empty() {
        return Err(AppError::Validation("Currency code cannot be empty".to_string()));
    }

    if amount.is_negative() {
        return Err(AppError::Validation(
            format!("Amount cannot be negative: {}", amount)
        ));
    }

    let stripe_amount = if is_zero_decimal_currency(currency) {
        amount.clone()
    } else {
        amount * BigDecimal::from(100)
    };

    if !stripe_amount.is_integer() {
        return Err(AppError::Validation(
            format!("Amount {} {} has more precision than Stripe accepts", amount, currency)
        ));
    }

    stripe_amount.to_i64()
        .ok_or_else(|| AppError::Validation(
            format!("Amount {} {} cannot be converted to Stripe integer format", amount, currency)
        ))
}

/// Zero-decimal currencies per https://docs.stripe.com/currencies#zero-decimal
fn is_zero_decimal_currency(currency: &str) -> bool {
    matches!(
        currency.to_uppercase().as_str(),
        "BIF" | "CLP" | "DJF" | "GNF" | "JPY" | "KMF" | "KRW" |
        "MGA" | "PYG" | "RWF" | "UGX" | "VND" | "VUV" | "XAF" |
        "XOF" | "XPF"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_decimal_to_stripe_cents() {
        let amount = BigDecimal::from_str("49.90").unwrap();
        assert_eq!(decimal_to_stripe_cents(&amount, "EUR").unwrap(), 4990);
        let amount = BigDecimal::from(12500);
        assert_eq!(decimal_to_stripe_cents(&amount, "HUF").unwrap(), 1_250_000);
        assert_eq!(decimal_to_stripe_cents(&amount, "JPY").unwrap(), 12500);
    }

    #[test]
    fn test_fractional_cents_are_rejected() {
        let amount = BigDecimal::from_str("1.005").unwrap();
        assert!(decimal_to_stripe_cents(&amount, "EUR").is_err());
        assert!(decimal_to_stripe_cents(&BigDecimal::from(-1), "EUR").is_err());
    }

    #[test]
    fn test_stripe_cents_to_decimal() {
        assert_eq!(stripe_cents_to_decimal(4990, "eur").unwrap(), BigDecimal::from_str("49.90").unwrap());
        assert_eq!(stripe_cents_to_decimal(500, "JPY").unwrap(), BigDecimal::from(500));
    }
}
