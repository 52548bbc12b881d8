//! Coercion of raw CSV cells into typed [`Value`]s.
//!
//! Numeric cells tolerate the decorations Seller Central exports carry
//! (`$`, `%`, thousands separators); dates are strictly `YYYY-MM-DD`;
//! booleans accept `true/false/1/0/yes/no` in any case; strings are kept
//! verbatim after NFC normalization.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::schema::SemanticType;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("value is empty")]
    Empty,
    #[error("not an integer: {0:?}")]
    InvalidInteger(String),
    #[error("not a decimal number: {0:?}")]
    InvalidDecimal(String),
    #[error("non-finite number: {0:?}")]
    NonFinite(String),
    #[error("not a YYYY-MM-DD date: {0:?}")]
    InvalidDate(String),
    #[error("not a boolean (expected true/false/1/0/yes/no): {0:?}")]
    InvalidBool(String),
}

/// Coerce a raw cell into a typed value.
///
/// # Errors
///
/// Returns a [`CoercionError`] describing why the cell does not conform to
/// `semantic_type`. Empty (or whitespace-only) cells are always
/// [`CoercionError::Empty`]; deciding whether that is acceptable is the
/// caller's job.
pub fn coerce(raw: &str, semantic_type: SemanticType) -> Result<Value, CoercionError> {
    if raw.trim().is_empty() {
        return Err(CoercionError::Empty);
    }
    match semantic_type {
        SemanticType::Int => parse_int(raw).map(Value::Int),
        SemanticType::Decimal => parse_decimal(raw).map(Value::Decimal),
        SemanticType::Date => parse_date(raw).map(Value::Date),
        SemanticType::Bool => parse_bool(raw).map(Value::Bool),
        SemanticType::String => Ok(Value::Text(raw.nfc().collect())),
    }
}

/// Strip currency and percent symbols, thousands separators, and whitespace.
#[must_use]
pub fn strip_numeric_decorations(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '$' | '%' | ',') && !c.is_whitespace())
        .collect()
}

fn is_non_finite(cleaned: &str) -> bool {
    let lower = cleaned.trim_start_matches(['+', '-']).to_ascii_lowercase();
    matches!(lower.as_str(), "nan" | "inf" | "infinity")
}

/// Parse a decorated decimal string.
///
/// # Errors
///
/// Returns [`CoercionError::NonFinite`] for NaN/infinity spellings and
/// [`CoercionError::InvalidDecimal`] for anything else unparseable.
pub fn parse_decimal(raw: &str) -> Result<Decimal, CoercionError> {
    let cleaned = strip_numeric_decorations(raw);
    if is_non_finite(&cleaned) {
        return Err(CoercionError::NonFinite(raw.to_string()));
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| CoercionError::InvalidDecimal(raw.to_string()))
}

fn parse_int(raw: &str) -> Result<i64, CoercionError> {
    let cleaned = strip_numeric_decorations(raw);
    if is_non_finite(&cleaned) {
        return Err(CoercionError::NonFinite(raw.to_string()));
    }
    if let Ok(v) = cleaned.parse::<i64>() {
        return Ok(v);
    }
    // Spreadsheet exports often render integers as "10.0".
    let decimal = Decimal::from_str(&cleaned)
        .map_err(|_| CoercionError::InvalidInteger(raw.to_string()))?;
    if decimal.fract().is_zero() {
        decimal
            .to_i64()
            .ok_or_else(|| CoercionError::InvalidInteger(raw.to_string()))
    } else {
        Err(CoercionError::InvalidInteger(raw.to_string()))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, CoercionError> {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(CoercionError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| CoercionError::InvalidDate(raw.to_string()))
}

fn parse_bool(raw: &str) -> Result<bool, CoercionError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CoercionError::InvalidBool(raw.to_string())),
    }
}
