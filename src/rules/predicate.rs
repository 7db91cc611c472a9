//! Typed rule predicates
//!
//! Rule expressions are parsed once into a small closed grammar instead of
//! being evaluated dynamically:
//!
//! ```text
//! predicate := clause ("and" clause)*
//! clause    := "true" | "false" | metric | metric op operand
//! operand   := number | metric | number "*" metric | metric "*" number
//! op        := "<" | "<=" | ">" | ">=" | "==" | "!="
//! ```

use super::metrics::{Metric, Metrics};
use crate::{Result, WaveError};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            _ => return None,
        })
    }

    #[inline]
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => (lhs - rhs).abs() < 1e-9,
            CmpOp::Ne => (lhs - rhs).abs() >= 1e-9,
        }
    }

    /// Lower bound (`>`/`>=`) or upper bound (`<`/`<=`)
    pub fn is_lower_bound(self) -> bool {
        matches!(self, CmpOp::Gt | CmpOp::Ge)
    }

    pub fn is_upper_bound(self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Literal(f64),
    Metric(Metric),
    /// `factor * metric`
    Scaled(f64, Metric),
}

impl Operand {
    fn value(&self, metrics: &Metrics) -> Option<f64> {
        match *self {
            Operand::Literal(x) => Some(x),
            Operand::Metric(m) => metrics.get(m),
            Operand::Scaled(k, m) => metrics.get(m).map(|v| k * v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Const(bool),
    /// Bare boolean metric, true when non-zero
    Flag(Metric),
    Compare {
        metric: Metric,
        op: CmpOp,
        rhs: Operand,
    },
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn parse(expr: &str) -> Result<Self> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err(WaveError::InvalidConfig("empty rule expression".to_string()));
        }
        let mut clauses = Vec::new();
        for clause in tokens.split(|t| t.eq_ignore_ascii_case("and")) {
            clauses.push(parse_clause(clause, expr)?);
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Predicate::All(clauses)
        })
    }

    /// Missing metrics make the predicate fail.
    pub fn eval(&self, metrics: &Metrics) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::Flag(m) => metrics.get(*m).is_some_and(|v| v != 0.0),
            Predicate::Compare { metric, op, rhs } => {
                match (metrics.get(*metric), rhs.value(metrics)) {
                    (Some(lhs), Some(rhs)) => op.apply(lhs, rhs),
                    _ => false,
                }
            }
            Predicate::All(parts) => parts.iter().all(|p| p.eval(metrics)),
        }
    }

    /// Literal bound on `metric`: `(op, literal)` pairs of every comparison
    /// against a constant, conjunctions included.
    pub fn literal_bounds(&self, metric: Metric) -> Vec<(CmpOp, f64)> {
        match self {
            Predicate::Compare {
                metric: m,
                op,
                rhs: Operand::Literal(x),
            } if *m == metric => vec![(*op, *x)],
            Predicate::All(parts) => parts.iter().flat_map(|p| p.literal_bounds(metric)).collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_clause(tokens: &[String], expr: &str) -> Result<Predicate> {
    let fail = || WaveError::InvalidConfig(format!("unsupported rule expression: {expr}"));
    let metric = |token: &str| Metric::from_name(token).ok_or_else(fail);

    match tokens {
        [one] if one.eq_ignore_ascii_case("true") => Ok(Predicate::Const(true)),
        [one] if one.eq_ignore_ascii_case("false") => Ok(Predicate::Const(false)),
        [one] => Ok(Predicate::Flag(metric(one.as_str())?)),
        [lhs, op, rest @ ..] => {
            let metric_lhs = metric(lhs.as_str())?;
            let op = CmpOp::parse(op.as_str()).ok_or_else(fail)?;
            let rhs = match rest {
                [x] => match x.parse::<f64>() {
                    Ok(v) => Operand::Literal(v),
                    Err(_) => Operand::Metric(metric(x.as_str())?),
                },
                [a, star, b] if star == "*" => match (a.parse::<f64>(), b.parse::<f64>()) {
                    (Ok(k), Err(_)) => Operand::Scaled(k, metric(b.as_str())?),
                    (Err(_), Ok(k)) => Operand::Scaled(k, metric(a.as_str())?),
                    _ => return Err(fail()),
                },
                _ => return Err(fail()),
            };
            Ok(Predicate::Compare {
                metric: metric_lhs,
                op,
                rhs,
            })
        }
        [] => Err(fail()),
    }
}

fn tokenize(expr: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if matches!(c, '<' | '>' | '=' | '!') {
            let start = i;
            i += 1;
            if i < chars.len() && chars[i] == '=' {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c == '*' {
            tokens.push("*".to_string());
            i += 1;
        } else {
            return Err(WaveError::InvalidConfig(format!(
                "unexpected character {c:?} in rule expression: {expr}"
            )));
        }
    }
    Ok(tokens)
}
