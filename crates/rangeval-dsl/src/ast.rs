//! Syntax tree of a parsed rule
//!
//! A rule is a sequence of statements. Expressions are pure; statements carry
//! the control flow (checks, assignments, lookups, returns and the three
//! conditional forms). Every `Display` impl renders text the parser accepts.

use crate::functions::Builtin;
use std::fmt;

/// Reserved lowercase names resolved from the evaluation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialVar {
    /// `x`: the value being validated
    Current,
    /// `m`: the missing sentinel
    Missing,
    /// `n`: the not-applicable sentinel
    NotApplicable,
    /// `track`: the subject's track code
    TrackCode,
    /// `hivisit`: highest visit number recorded for the subject
    HighestVisit,
    /// `enrolldate`
    EnrollDate,
    /// `enrollgroup`
    EnrollGroup,
}

impl SpecialVar {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Self::Current),
            "m" => Some(Self::Missing),
            "n" => Some(Self::NotApplicable),
            "track" => Some(Self::TrackCode),
            "hivisit" => Some(Self::HighestVisit),
            "enrolldate" => Some(Self::EnrollDate),
            "enrollgroup" => Some(Self::EnrollGroup),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Current => "x",
            Self::Missing => "m",
            Self::NotApplicable => "n",
            Self::TrackCode => "track",
            Self::HighestVisit => "hivisit",
            Self::EnrollDate => "enrolldate",
            Self::EnrollGroup => "enrollgroup",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// How two operands are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Numeric when both sides read as numbers (empty reads as 0), text otherwise
    Loose,
    /// Exact text comparison; used when either side is a string literal
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// One member of an `in (...)` list
#[derive(Debug, Clone, PartialEq)]
pub enum SetMember {
    /// A value; `text` forces exact text comparison (quoted literals)
    Value { value: ExpressionNode, text: bool },
    /// `1..9`: any integer in the closed range
    IntRange(i64, i64),
    /// `a..c`: any single character in the closed range
    CharRange(char, char),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Literal(Literal),
    /// A field of the record being validated
    FieldReference(String),
    /// An uppercase rule-local variable
    LocalVariable(String),
    /// `VAR.field` on a row bound by a cross-table lookup
    RowField { var: String, field: String },
    SpecialVariable(SpecialVar),
    Negate(Box<ExpressionNode>),
    Arithmetic {
        op: ArithOp,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },
    /// `+` with a string operand
    Concat {
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },
    Compare {
        op: CmpOp,
        mode: CompareMode,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },
    Logical {
        op: LogicOp,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },
    Between {
        subject: Box<ExpressionNode>,
        low: Box<ExpressionNode>,
        high: Box<ExpressionNode>,
        negated: bool,
    },
    InSet {
        subject: Box<ExpressionNode>,
        members: Vec<SetMember>,
        negated: bool,
    },
    FunctionCall {
        function: Builtin,
        args: Vec<ExpressionNode>,
    },
}

impl ExpressionNode {
    pub fn number(value: f64) -> Self {
        Self::Literal(Literal::Number(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn current() -> Self {
        Self::SpecialVariable(SpecialVar::Current)
    }

    pub fn call(function: Builtin, args: Vec<ExpressionNode>) -> Self {
        Self::FunctionCall { function, args }
    }

    pub fn and(left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::Logical {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::Logical {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CmpOp, mode: CompareMode, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::Compare {
            op,
            mode,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self, Self::Literal(Literal::Text(_)))
    }

    /// Literal text or a concatenation
    pub fn is_stringish(&self) -> bool {
        matches!(self, Self::Literal(Literal::Text(_)) | Self::Concat { .. })
    }

    pub fn is_zero_literal(&self) -> bool {
        matches!(self, Self::Literal(Literal::Number(n)) if *n == 0.0)
    }
}

/// `column op value` inside a lookup's braces
#[derive(Debug, Clone, PartialEq)]
pub struct LookupPredicate {
    pub column: String,
    pub op: CmpOp,
    pub value: ExpressionNode,
}

/// `table{...}` bound to a local variable
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTableLookup {
    /// Position of the lookup within its rule; used to memoize fetches
    pub id: usize,
    pub table: String,
    /// Written predicates followed by implied index and row-entry filters
    pub predicates: Vec<LookupPredicate>,
    pub limit: usize,
}

/// A condition and the statements it guards
#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    pub condition: ExpressionNode,
    pub body: Vec<Statement>,
}

/// What a `case` label matches
#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    /// `case 1, 2:`
    Values(Vec<ExpressionNode>),
    /// `case > 5:`
    Compare(CmpOp, ExpressionNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub label: CaseLabel,
    /// The label applied to the switch subject
    pub condition: ExpressionNode,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Rejects on `false` or on non-empty text (the text becomes the message)
    Check(ExpressionNode),
    Assign { var: String, value: ExpressionNode },
    Lookup { var: String, lookup: CrossTableLookup },
    /// Ends evaluation with the check result of the expression
    Return(ExpressionNode),
    If {
        condition: ExpressionNode,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
    },
    Switch {
        subject: ExpressionNode,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Statement>>,
    },
    /// `[cond: body][cond: body] fallthrough`; the first true arm wins
    BracketChain {
        arms: Vec<Arm>,
        fallthrough: Option<Vec<Statement>>,
        grouped: bool,
    },
}

/// A whole parsed rule
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rule {
    pub statements: Vec<Statement>,
    /// Local variables in order of first appearance
    pub locals: Vec<String>,
    /// Number of cross-table lookups
    pub lookups: usize,
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", quote(s)),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for SetMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { value, .. } => write!(f, "{}", value),
            Self::IntRange(low, high) => write!(f, "{}..{}", low, high),
            Self::CharRange(low, high) => write!(f, "{}..{}", low, high),
        }
    }
}

fn join<T: fmt::Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => write!(f, "{}", literal),
            Self::FieldReference(name) | Self::LocalVariable(name) => write!(f, "{}", name),
            Self::RowField { var, field } => write!(f, "{}.{}", var, field),
            Self::SpecialVariable(special) => write!(f, "{}", special.name()),
            Self::Negate(inner) => write!(f, "-({})", inner),
            Self::Arithmetic { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Concat { left, right } => write!(f, "({} + {})", left, right),
            Self::Compare { op, left, right, .. } => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Logical { op, left, right } => {
                let word = match op {
                    LogicOp::And => "and",
                    LogicOp::Or => "or",
                };
                write!(f, "({} {} {})", left, word, right)
            }
            Self::Between { subject, low, high, negated } => {
                let word = if *negated { "notbetween" } else { "between" };
                write!(f, "({} {} {} and {})", subject, word, low, high)
            }
            Self::InSet { subject, members, negated } => {
                let word = if *negated { "notin" } else { "in" };
                write!(f, "({} {} ({}))", subject, word, join(members, ", "))
            }
            Self::FunctionCall { function, args } => write!(f, "{}({})", function, join(args, ", ")),
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, body: &[Statement]) -> fmt::Result {
    write!(f, "{}", join(body, "; "))
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check(expr) => write!(f, "{}", expr),
            Self::Assign { var, value } => write!(f, "{} = {}", var, value),
            Self::Lookup { var, lookup } => {
                let predicates: Vec<String> = lookup
                    .predicates
                    .iter()
                    .map(|p| format!("{} {} {}", p.column, p.op.symbol(), p.value))
                    .collect();
                write!(f, "{} = {}{{{}}}", var, lookup.table, predicates.join(" and "))
            }
            Self::Return(expr) => write!(f, "return {}", expr),
            Self::If { condition, then_branch, else_branch } => {
                write!(f, "if {} then ", condition)?;
                write_block(f, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " else ")?;
                    write_block(f, else_branch)?;
                }
                write!(f, " endif")
            }
            Self::Switch { subject, cases, default } => {
                write!(f, "switch {}", subject)?;
                for case in cases {
                    match &case.label {
                        CaseLabel::Values(values) => write!(f, " case {}: ", join(values, ", "))?,
                        CaseLabel::Compare(op, value) => write!(f, " case {} {}: ", op.symbol(), value)?,
                    }
                    write_block(f, &case.body)?;
                }
                if let Some(default) = default {
                    write!(f, " else ")?;
                    write_block(f, default)?;
                }
                write!(f, " endswitch")
            }
            Self::BracketChain { arms, fallthrough, grouped } => {
                if *grouped {
                    write!(f, "{{")?;
                }
                for arm in arms {
                    write!(f, "[{}: ", arm.condition)?;
                    write_block(f, &arm.body)?;
                    write!(f, "]")?;
                }
                if let Some(fallthrough) = fallthrough {
                    write!(f, " ")?;
                    write_block(f, fallthrough)?;
                }
                if *grouped {
                    write!(f, "}}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.statements, "; "))
    }
}
