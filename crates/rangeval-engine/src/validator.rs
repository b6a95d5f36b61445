//! Compiled validators and their evaluation
//!
//! A validator is immutable once built and can be shared between tasks.
//! Each call to [`CompiledValidator::evaluate`] runs the program in a fresh
//! frame; lookups are fetched at most once per call.

use crate::builtins;
use crate::compiler::RuleSource;
use crate::context::ValidationContext;
use crate::program::{Expr, Instr, LookupPlan, Member, Program};
use crate::value::Value;
use rangeval_catalog::{Filter, Row, RowQuery};
use rangeval_dsl::{ArithOp, CmpOp, CompareMode, Rule, SpecialVar};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of validating one submitted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            message: None,
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledValidator {
    table: String,
    field: String,
    source: RuleSource,
    digest: String,
    rule: Rule,
    program: Program,
}

impl CompiledValidator {
    pub(crate) fn new(
        table: String,
        field: String,
        source: RuleSource,
        digest: String,
        rule: Rule,
        program: Program,
    ) -> Self {
        Self {
            table,
            field,
            source,
            digest,
            rule,
            program,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    /// SHA-256 of the rule text and the metadata it was compiled against
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Validate a submitted value
    ///
    /// A lookup that cannot run (no record source, timeout, fetch failure)
    /// rejects the value; it never accepts by default.
    pub async fn evaluate(&self, value: &str, ctx: &ValidationContext) -> Verdict {
        let mut frame = Frame::new(&self.program, value, ctx);
        let mut pc = 0;

        while let Some(instr) = self.program.code.get(pc) {
            pc += 1;
            match instr {
                Instr::Declare { slot } => frame.set(*slot, Value::Empty),
                Instr::Assign { slot, expr } => {
                    let value = frame.eval(expr);
                    frame.set(*slot, value);
                }
                Instr::Bind { slot, lookup } => match self.fetch(&mut frame, *lookup).await {
                    Ok(row) => {
                        frame.set(*slot, Value::Bool(row.is_some()));
                        frame.rows.insert(*slot, row);
                    }
                    Err(message) => return Verdict::reject(message),
                },
                Instr::Check { expr, message } => {
                    if let Some(rejection) = rejection(frame.eval(expr), message) {
                        return Verdict::reject(rejection);
                    }
                }
                Instr::Return { expr, message } => {
                    return match rejection(frame.eval(expr), message) {
                        Some(rejection) => Verdict::reject(rejection),
                        None => Verdict::accept(),
                    };
                }
                Instr::Accept => return Verdict::accept(),
                Instr::JumpUnless { cond, target } => {
                    if !frame.eval(cond).is_truthy() {
                        pc = *target;
                    }
                }
                Instr::Jump { target } => pc = *target,
            }
        }

        Verdict::accept()
    }

    async fn fetch(&self, frame: &mut Frame<'_>, id: usize) -> Result<Option<Row>, String> {
        if let Some(row) = frame.fetched.get(&id) {
            return Ok(row.clone());
        }

        let Some(plan) = self.program.lookups.get(id) else {
            return Err(format!("Lookup {} is not part of this rule.", id));
        };
        let query = frame.query(plan);

        let ctx = frame.ctx;
        let Some(source) = ctx.record_source() else {
            warn!(table = %self.table, field = %self.field, query = %query, "No record source for lookup");
            return Err(format!(
                "Lookup on '{}' could not run: no record source is configured.",
                plan.table
            ));
        };

        let timeout = ctx.lookup_timeout();
        match tokio::time::timeout(timeout, source.fetch_row(&query)).await {
            Ok(Ok(row)) => {
                debug!(query = %query, found = row.is_some(), "Lookup finished");
                frame.fetched.insert(id, row.clone());
                Ok(row)
            }
            Ok(Err(error)) => {
                warn!(table = %self.table, field = %self.field, query = %query, %error, "Lookup failed");
                Err(format!("Lookup on '{}' failed: {}", plan.table, error))
            }
            Err(_) => {
                warn!(
                    table = %self.table,
                    field = %self.field,
                    query = %query,
                    timeout_ms = timeout.as_millis() as u64,
                    "Lookup timed out"
                );
                Err(format!(
                    "Lookup on '{}' timed out after {} ms.",
                    plan.table,
                    timeout.as_millis()
                ))
            }
        }
    }
}

/// `false` rejects with the check's message; non-empty text is the message
fn rejection(value: Value, message: &str) -> Option<String> {
    match value {
        Value::Bool(false) => Some(message.to_string()),
        Value::Text(text) if !text.is_empty() => Some(text),
        _ => None,
    }
}

/// Mutable state of one evaluation
struct Frame<'v> {
    current: Value,
    locals: Vec<Value>,
    /// Rows bound to local slots by lookups
    rows: HashMap<usize, Option<Row>>,
    /// Rows by lookup id
    fetched: HashMap<usize, Option<Row>>,
    ctx: &'v ValidationContext,
}

impl<'v> Frame<'v> {
    fn new(program: &Program, value: &str, ctx: &'v ValidationContext) -> Self {
        Self {
            current: Value::from_raw(value),
            locals: vec![Value::Empty; program.locals.len()],
            rows: HashMap::new(),
            fetched: HashMap::new(),
            ctx,
        }
    }

    fn set(&mut self, slot: usize, value: Value) {
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, Value::Empty);
        }
        self.locals[slot] = value;
    }

    fn query(&self, plan: &LookupPlan) -> RowQuery {
        RowQuery {
            table: plan.table.clone(),
            filters: plan
                .filters
                .iter()
                .map(|filter| Filter {
                    column: filter.column.clone(),
                    op: filter.op,
                    value: self.eval(&filter.value).to_text(),
                })
                .collect(),
            limit: plan.limit,
        }
    }

    fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Const(value) => value.clone(),
            Expr::Field(name) => raw(self.ctx.field(name)),
            Expr::Special(SpecialVar::Current) => self.current.clone(),
            Expr::Special(special) => raw(self.ctx.special(*special)),
            Expr::Local(slot) => self.locals.get(*slot).cloned().unwrap_or(Value::Empty),
            Expr::RowField { slot, column } => raw(
                self.rows
                    .get(slot)
                    .and_then(Option::as_ref)
                    .and_then(|row| row.get(column))
                    .map(String::as_str),
            ),
            Expr::Negate(inner) => match self.eval(inner).strict_number() {
                Some(n) => Value::Number(-n),
                None => Value::Empty,
            },
            Expr::Arith { op, left, right } => arithmetic(*op, self.eval(left), self.eval(right)),
            Expr::Concat(left, right) => {
                let mut text = self.eval(left).to_text();
                text.push_str(&self.eval(right).to_text());
                Value::from_raw(&text)
            }
            Expr::Compare { op, mode, left, right } => {
                Value::Bool(self.eval(left).compare(*op, *mode, &self.eval(right)))
            }
            Expr::And(left, right) => {
                Value::Bool(self.eval(left).is_truthy() && self.eval(right).is_truthy())
            }
            Expr::Or(left, right) => {
                Value::Bool(self.eval(left).is_truthy() || self.eval(right).is_truthy())
            }
            Expr::Between {
                subject,
                low,
                high,
                negated,
            } => {
                let (subject, low, high) = (self.eval(subject), self.eval(low), self.eval(high));
                let inside = match (low.strict_number(), high.strict_number()) {
                    // Numeric bounds take numeric subjects only; empty is not 0 here
                    (Some(low), Some(high)) => subject
                        .strict_number()
                        .is_some_and(|n| n >= low && n <= high),
                    _ => {
                        subject.compare(CmpOp::Ge, CompareMode::Loose, &low)
                            && subject.compare(CmpOp::Le, CompareMode::Loose, &high)
                    }
                };
                Value::Bool(inside != *negated)
            }
            Expr::InSet {
                subject,
                members,
                negated,
            } => {
                let subject = self.eval(subject);
                let found = members.iter().any(|member| self.member_matches(&subject, member));
                Value::Bool(found != *negated)
            }
            Expr::Call { function, args } => {
                let args: Vec<Value> = args.iter().map(|arg| self.eval(arg)).collect();
                builtins::call(*function, &args, self.ctx.today())
            }
        }
    }

    fn member_matches(&self, subject: &Value, member: &Member) -> bool {
        match member {
            Member::Value { expr, text: true } => {
                subject.compare(CmpOp::Eq, CompareMode::Text, &self.eval(expr))
            }
            Member::Value { expr, text: false } => {
                let value = self.eval(expr);
                // An empty response never matches a numeric code
                if subject.is_empty() && value.strict_number().is_some() {
                    return false;
                }
                subject.compare(CmpOp::Eq, CompareMode::Loose, &value)
            }
            Member::IntRange(lo, hi) => subject
                .strict_number()
                .is_some_and(|n| n.fract() == 0.0 && n >= *lo as f64 && n <= *hi as f64),
            Member::CharRange(lo, hi) => {
                let text = subject.to_text();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => (*lo..=*hi).contains(&c),
                    _ => false,
                }
            }
        }
    }
}

fn raw(value: Option<&str>) -> Value {
    value.map(Value::from_raw).unwrap_or(Value::Empty)
}

fn arithmetic(op: ArithOp, left: Value, right: Value) -> Value {
    let (Some(a), Some(b)) = (left.loose_number(), right.loose_number()) else {
        return Value::Empty;
    };
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div if b == 0.0 => return Value::Empty,
        ArithOp::Div => a / b,
        ArithOp::Rem if b == 0.0 => return Value::Empty,
        ArithOp::Rem => a % b,
    };
    Value::Number(result)
}
