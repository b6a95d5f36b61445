//! Lowered validation program
//!
//! A flat instruction list over expressions whose local variables are
//! resolved to slots. Jumps address instructions by index.

use crate::value::Value;
use rangeval_catalog::FilterOp;
use rangeval_dsl::{ArithOp, Builtin, CmpOp, CompareMode, SpecialVar};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Field(String),
    Special(SpecialVar),
    Local(usize),
    /// Column of the row bound to a slot; empty when no row was found
    RowField { slot: usize, column: String },
    Negate(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Concat(Box<Expr>, Box<Expr>),
    Compare {
        op: CmpOp,
        mode: CompareMode,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Between {
        subject: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    InSet {
        subject: Box<Expr>,
        members: Vec<Member>,
        negated: bool,
    },
    Call { function: Builtin, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Value { expr: Expr, text: bool },
    IntRange(i64, i64),
    CharRange(char, char),
}

/// One filter of a lookup; the value is evaluated when the lookup runs
#[derive(Debug, Clone, PartialEq)]
pub struct LookupFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupPlan {
    pub table: String,
    pub filters: Vec<LookupFilter>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Initialise a local slot to empty
    Declare { slot: usize },
    Assign { slot: usize, expr: Expr },
    /// Run lookup `lookup` and bind its row to `slot`
    Bind { slot: usize, lookup: usize },
    Check { expr: Expr, message: String },
    Return { expr: Expr, message: String },
    /// Stop and accept
    Accept,
    JumpUnless { cond: Expr, target: usize },
    Jump { target: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub locals: Vec<String>,
    pub lookups: Vec<LookupPlan>,
    pub code: Vec<Instr>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(Value::Text(t)) => write!(f, "'{}'", t.replace('\'', "''")),
            Self::Const(Value::Empty) => write!(f, "''"),
            Self::Const(v) => write!(f, "{}", v),
            Self::Field(name) => write!(f, "{}", name),
            Self::Special(special) => write!(f, "{}", special.name()),
            Self::Local(slot) => write!(f, "${}", slot),
            Self::RowField { slot, column } => write!(f, "${}.{}", slot, column),
            Self::Negate(inner) => write!(f, "-{}", inner),
            Self::Arith { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Concat(left, right) => write!(f, "({} + {})", left, right),
            Self::Compare { op, mode, left, right } => {
                let suffix = match mode {
                    CompareMode::Loose => "",
                    CompareMode::Text => "$",
                };
                write!(f, "({} {}{} {})", left, op.symbol(), suffix, right)
            }
            Self::And(left, right) => write!(f, "({} and {})", left, right),
            Self::Or(left, right) => write!(f, "({} or {})", left, right),
            Self::Between { subject, low, high, negated } => {
                let keyword = if *negated { "notbetween" } else { "between" };
                write!(f, "({} {} {} and {})", subject, keyword, low, high)
            }
            Self::InSet { subject, members, negated } => {
                let keyword = if *negated { "notin" } else { "in" };
                write!(f, "({} {} (", subject, keyword)?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match member {
                        Member::Value { expr, .. } => write!(f, "{}", expr)?,
                        Member::IntRange(lo, hi) => write!(f, "{}..{}", lo, hi)?,
                        Member::CharRange(lo, hi) => write!(f, "{}..{}", lo, hi)?,
                    }
                }
                write!(f, "))")
            }
            Self::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, name) in self.locals.iter().enumerate() {
            writeln!(f, "; ${} = {}", slot, name)?;
        }
        for (id, lookup) in self.lookups.iter().enumerate() {
            write!(f, "; lookup {} = {}{{", id, lookup.table)?;
            for (i, filter) in lookup.filters.iter().enumerate() {
                if i > 0 {
                    write!(f, " and ")?;
                }
                write!(f, "{} {} {}", filter.column, filter.op.as_str(), filter.value)?;
            }
            writeln!(f, "}} limit {}", lookup.limit)?;
        }
        for (index, instr) in self.code.iter().enumerate() {
            write!(f, "{:>4}  ", index)?;
            match instr {
                Instr::Declare { slot } => writeln!(f, "declare ${}", slot)?,
                Instr::Assign { slot, expr } => writeln!(f, "${} := {}", slot, expr)?,
                Instr::Bind { slot, lookup } => writeln!(f, "${} := lookup {}", slot, lookup)?,
                Instr::Check { expr, message } => writeln!(f, "check {} else '{}'", expr, message)?,
                Instr::Return { expr, message } => writeln!(f, "return {} else '{}'", expr, message)?,
                Instr::Accept => writeln!(f, "accept")?,
                Instr::JumpUnless { cond, target } => writeln!(f, "unless {} goto {}", cond, target)?,
                Instr::Jump { target } => writeln!(f, "goto {}", target)?,
            }
        }
        Ok(())
    }
}
