//! Validation of user-supplied identifiers: vehicle plates, phone numbers and EU VAT numbers.

use crate::error::AppError;
use regex::Regex;
use once_cell::sync::Lazy;

/// Normalized plates are 2-12 uppercase alphanumerics.
static PLATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,12}$").expect("plate pattern compiles"));

/// E.164: leading plus, 8-15 digits, no leading zero.
static E164_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("phone pattern compiles"));

/// Two-letter country prefix followed by 2-13 alphanumerics.
static EU_VAT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{2})([0-9A-Z+*]{2,13})$").expect("vat pattern compiles"));

/// Uppercases a plate and strips spaces and dashes, then validates the result.
pub fn normalize_plate(field: &str, raw: &str) -> Result<String, AppError> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();

    if !PLATE_PATTERN.is_match(&normalized) {
        return Err(AppError::Validation(format!(
            "Invalid {} '{}': expected 2-12 letters or digits",
            field, raw
        )));
    }
    Ok(normalized)
}

/// Normalizes an optional plate; blank input becomes `None`.
pub fn normalize_optional_plate(field: &str, raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => normalize_plate(field, value).map(Some),
    }
}

/// Validates an E.164 phone number after removing spaces.
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if !E164_PATTERN.is_match(&compact) {
        return Err(AppError::Validation(format!(
            "Invalid phone number '{}': expected E.164 format such as +36301234567",
            raw
        )));
    }
    Ok(compact)
}

/// Splits an EU VAT number into its country code and national part.
pub fn split_eu_vat_number(raw: &str) -> Result<(String, String), AppError> {
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '*')
        .collect::<String>()
        .to_uppercase();

    let captures = EU_VAT_PATTERN
        .captures(&compact)
        .ok_or_else(|| AppError::Validation(format!("Invalid EU VAT number '{}'", raw)))?;

    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Trims a free-text field and rejects it when empty or too long.
pub fn required_text(field: &str, raw: Option<&str>, max_len: usize) -> Result<String, AppError> {
    let value = raw.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}
