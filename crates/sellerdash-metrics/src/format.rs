//! Display formatting for metric values.

use crate::types::VisualizationKind;

/// Insert `,` every three digits of an unsigned integer string.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `value` with `decimals` places and grouped thousands; the sign is
/// returned separately so currency can place it before `$`.
fn grouped(value: f64, decimals: usize) -> (bool, String) {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let mut text = group_thousands(int_part);
    if let Some(frac) = frac_part {
        text.push('.');
        text.push_str(frac);
    }
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    (value.is_sign_negative() && !is_zero, text)
}

#[must_use]
pub fn format_currency(value: f64) -> String {
    let (negative, text) = grouped(value, 2);
    if negative {
        format!("-${text}")
    } else {
        format!("${text}")
    }
}

/// The value is already in percent units.
#[must_use]
pub fn format_percentage(value: f64) -> String {
    let (negative, text) = grouped(value, 2);
    let text = text.replace(',', "");
    if negative {
        format!("-{text}%")
    } else {
        format!("{text}%")
    }
}

/// Integers get thousands separators only; fractions get two decimals.
#[must_use]
pub fn format_number(value: f64) -> String {
    let decimals = if value.fract() == 0.0 { 0 } else { 2 };
    let (negative, text) = grouped(value, decimals);
    if negative {
        format!("-{text}")
    } else {
        text
    }
}

#[must_use]
pub fn format_value(value: f64, kind: VisualizationKind) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    match kind {
        VisualizationKind::Currency => format_currency(value),
        VisualizationKind::Percentage => format_percentage(value),
        VisualizationKind::Number => format_number(value),
        // Shortest representation that parses back to the same f64.
        VisualizationKind::Custom => value.to_string(),
    }
}

/// The rendering of zero for `kind`: `$0.00`, `0.00%`, `0` or `0`.
#[must_use]
pub fn zero_for(kind: VisualizationKind) -> String {
    format_value(0.0, kind)
}
