//! Runtime values
//!
//! Submitted responses and record fields arrive as raw text. Comparisons
//! follow the rule's compare mode: loose comparisons are numeric when both
//! sides read as numbers (an empty value reads as 0), text comparisons are
//! exact.

use rangeval_dsl::{CmpOp, CompareMode};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Wrap raw text; the empty string becomes [`Value::Empty`]
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            Self::Empty
        } else {
            Self::Text(raw.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Numeric reading used by loose comparisons and arithmetic
    pub fn loose_number(&self) -> Option<f64> {
        match self {
            Self::Empty => Some(0.0),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::Text(t) => parse_number(t),
        }
    }

    /// Numeric reading that refuses empty values and booleans
    pub fn strict_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) => parse_number(t),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(t) => !t.is_empty(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(t) => t.clone(),
        }
    }

    /// Length in characters of the text form
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.chars().count(),
            other => other.to_text().chars().count(),
        }
    }

    /// Compare two values under `mode`
    pub fn compare(&self, op: CmpOp, mode: CompareMode, other: &Value) -> bool {
        let ordering = match mode {
            CompareMode::Text => Some(self.to_text().cmp(&other.to_text())),
            CompareMode::Loose => self.loose_ordering(other),
        };

        let Some(ordering) = ordering else {
            return false;
        };

        match op {
            CmpOp::Eq => ordering.is_eq(),
            CmpOp::Ne => !ordering.is_eq(),
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::Le => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            CmpOp::Ge => ordering.is_ge(),
        }
    }

    fn loose_ordering(&self, other: &Value) -> Option<Ordering> {
        match (self.loose_number(), other.loose_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.to_text().cmp(&other.to_text())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Parse trimmed text as a finite number
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whole numbers print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values() {
        assert_eq!(Value::from_raw(""), Value::Empty);
        assert_eq!(Value::from_raw("12"), Value::Text("12".into()));
        assert_eq!(Value::from_raw(" 12 ").strict_number(), Some(12.0));
        assert_eq!(Value::from_raw("abc").strict_number(), None);
        assert_eq!(Value::from_raw("nan").strict_number(), None);
        assert_eq!(Value::Empty.strict_number(), None);
        assert_eq!(Value::Empty.loose_number(), Some(0.0));
    }

    #[test]
    fn loose_comparisons() {
        let ten = Value::from_raw("10");
        let nine = Value::from_raw("9");
        assert!(ten.compare(CmpOp::Gt, CompareMode::Loose, &nine));
        assert!(Value::from_raw("1.0").compare(CmpOp::Eq, CompareMode::Loose, &Value::Number(1.0)));
        assert!(Value::Empty.compare(CmpOp::Eq, CompareMode::Loose, &Value::Number(0.0)));
        assert!(Value::from_raw("abc").compare(CmpOp::Eq, CompareMode::Loose, &Value::Text("abc".into())));
        assert!(!Value::from_raw("abc").compare(CmpOp::Eq, CompareMode::Loose, &Value::Empty));
    }

    #[test]
    fn text_comparisons() {
        let ten = Value::from_raw("10");
        let nine = Value::from_raw("9");
        assert!(ten.compare(CmpOp::Lt, CompareMode::Text, &nine));
        assert!(!Value::from_raw("1.0").compare(CmpOp::Eq, CompareMode::Text, &Value::Number(1.0)));
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::Number(3.0).to_text(), "3");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::from_raw("héllo").len(), 5);
        assert!(!Value::Empty.is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
    }
}
