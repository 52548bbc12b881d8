//! Parser and evaluator for textual metric formulas.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := number | aggregate '(' column ')' | '(' expr ')'
//! ```

use std::fmt;

use sellerdash_core::{ReportRow, Value};

use crate::error::MetricError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    /// Rows whose value is present and non-zero.
    Count,
    Min,
    Max,
}

impl Aggregate {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(Aggregate::Sum),
            "avg" => Some(Aggregate::Avg),
            "count" => Some(Aggregate::Count),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Count => "count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Aggregate { func: Aggregate, column: String },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &source[start..end];
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {text:?}"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(source[start..end].to_string()));
            }
            other => return Err(format!("unexpected character {other:?} at {start}")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of formula")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let func = Aggregate::from_name(&name)
                    .ok_or_else(|| format!("unknown aggregate {name:?}"))?;
                self.expect(&Token::LParen)?;
                let column = match self.advance() {
                    Some(Token::Ident(column)) => column,
                    other => return Err(format!("expected a column name, found {other:?}")),
                };
                self.expect(&Token::RParen)?;
                Ok(Expr::Aggregate { func, column })
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end of formula".to_string()),
        }
    }
}

/// Parse `source` into an expression tree.
///
/// # Errors
///
/// Returns a description of the first syntax error.
pub fn parse(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("formula is empty".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected trailing {token:?}")),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Numeric reading of a cell. Missing and null cells read as 0; text is
/// parsed after stripping `$`, `%` and thousands separators.
///
/// # Errors
///
/// Returns [`MetricError::NonNumericValue`] for dates and unparseable text.
pub fn numeric_value(column: &str, value: Option<&Value>) -> Result<f64, MetricError> {
    let non_numeric = |raw: String| MetricError::NonNumericValue {
        column: column.to_string(),
        value: raw,
    };
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(Value::Text(text)) => {
            let cleaned: String = text
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | '%' | ','))
                .collect();
            if cleaned.is_empty() {
                return Ok(0.0);
            }
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| non_numeric(text.clone()))
        }
        Some(other) => other.as_f64().ok_or_else(|| non_numeric(other.to_string())),
    }
}

fn aggregate(func: Aggregate, column: &str, rows: &[ReportRow]) -> Result<f64, MetricError> {
    let mut values = Vec::with_capacity(rows.len());
    let mut present = 0u32;
    for row in rows {
        let cell = row.get(column);
        let value = numeric_value(column, cell)?;
        if cell.is_some_and(|v| !v.is_null()) && value != 0.0 {
            present += 1;
        }
        values.push(value);
    }
    if values.is_empty() {
        return Ok(0.0);
    }

    Ok(match func {
        Aggregate::Sum => values.iter().sum(),
        #[allow(clippy::cast_precision_loss)]
        Aggregate::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregate::Count => f64::from(present),
        Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

impl Expr {
    /// Evaluate over `rows`. Division by zero yields 0.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::NonNumericValue`] if an aggregated cell is not
    /// numeric.
    pub fn evaluate(&self, rows: &[ReportRow]) -> Result<f64, MetricError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Aggregate { func, column } => aggregate(*func, column, rows),
            Expr::Neg(inner) => Ok(-inner.evaluate(rows)?),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(rows)?;
                let rhs = rhs.evaluate(rows)?;
                Ok(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div if rhs == 0.0 => 0.0,
                    BinaryOp::Div => lhs / rhs,
                })
            }
        }
    }

    /// Columns referenced by aggregates, in formula order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Aggregate { column, .. } => out.push(column),
            Expr::Neg(inner) => inner.collect_columns(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }
}

#[cfg(test)]
#[path = "expression_test.rs"]
mod tests;
