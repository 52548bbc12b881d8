//! Declarative cross-column predicates evaluated on coerced rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCheck {
    /// `column <= today`.
    NotAfterToday { column: &'static str },
    /// `left <= right`.
    LessOrEqual {
        left: &'static str,
        right: &'static str,
    },
    /// `min <= column <= max`.
    Between {
        column: &'static str,
        min: Decimal,
        max: Decimal,
    },
    /// `column >= min`.
    AtLeast { column: &'static str, min: Decimal },
    /// `column > min`.
    GreaterThan { column: &'static str, min: Decimal },
    /// `total == sum(parts)`.
    SumEquals {
        total: &'static str,
        parts: Vec<&'static str>,
    },
    OneOf {
        column: &'static str,
        allowed: Vec<String>,
    },
    StartsWithAny {
        column: &'static str,
        prefixes: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticRule {
    pub name: &'static str,
    pub message: String,
    pub check: RuleCheck,
}

impl SemanticRule {
    #[must_use]
    pub fn new(name: &'static str, message: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            name,
            message: message.into(),
            check,
        }
    }

    /// Evaluate the rule. A rule whose operands are null does not apply and
    /// passes; a non-numeric operand where a number is expected fails.
    #[must_use]
    pub fn holds(&self, values: &BTreeMap<String, Value>, today: NaiveDate) -> bool {
        let get = |column: &str| values.get(column).unwrap_or(&Value::Null);
        let num = |column: &str| -> Option<Option<Decimal>> {
            match get(column) {
                Value::Null => None,
                other => Some(other.as_decimal()),
            }
        };

        match &self.check {
            RuleCheck::NotAfterToday { column } => match get(column) {
                Value::Null => true,
                Value::Date(d) => *d <= today,
                _ => false,
            },
            RuleCheck::LessOrEqual { left, right } => match (num(left), num(right)) {
                (Some(Some(l)), Some(Some(r))) => l <= r,
                (None, _) | (_, None) => true,
                _ => false,
            },
            RuleCheck::Between { column, min, max } => match num(column) {
                None => true,
                Some(Some(v)) => *min <= v && v <= *max,
                Some(None) => false,
            },
            RuleCheck::AtLeast { column, min } => match num(column) {
                None => true,
                Some(Some(v)) => v >= *min,
                Some(None) => false,
            },
            RuleCheck::GreaterThan { column, min } => match num(column) {
                None => true,
                Some(Some(v)) => v > *min,
                Some(None) => false,
            },
            RuleCheck::SumEquals { total, parts } => {
                let Some(total) = num(total) else {
                    return true;
                };
                let Some(total) = total else {
                    return false;
                };
                let mut sum = Decimal::ZERO;
                for part in parts {
                    match num(part) {
                        Some(Some(v)) => sum += v,
                        None => {}
                        Some(None) => return false,
                    }
                }
                sum == total
            }
            RuleCheck::OneOf { column, allowed } => match get(column) {
                Value::Null => true,
                Value::Text(s) => allowed.iter().any(|a| a == s),
                _ => false,
            },
            RuleCheck::StartsWithAny { column, prefixes } => match get(column) {
                Value::Null => true,
                Value::Text(s) => prefixes.iter().any(|p| s.starts_with(p.as_str())),
                _ => false,
            },
        }
    }
}
