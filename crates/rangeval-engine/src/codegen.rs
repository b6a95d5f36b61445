//! Code generator: syntax tree to [`Program`]
//!
//! Statements become a linear instruction list. Conditionals lower to
//! forward jumps; a bracket arm ends with `Accept` once its body has run, so
//! the first arm that matches finishes the rule. Every check gets a default
//! rejection message derived from the shape of its expression.

use crate::program::{Expr, Instr, LookupFilter, LookupPlan, Member, Program};
use crate::value::{format_number, Value};
use rangeval_catalog::FilterOp;
use rangeval_core::CompilerConfig;
use rangeval_dsl::{CmpOp, ExpressionNode, Literal, LogicOp, Rule, SetMember, Statement};

pub const ALLOWED_VALUES_MESSAGE: &str = "Response is not one of the allowed values.";

/// Lower a parsed rule
pub fn generate(rule: &Rule, config: &CompilerConfig) -> Program {
    let mut generator = Generator {
        locals: rule.locals.clone(),
        lookups: Vec::new(),
        code: Vec::new(),
        default_message: &config.default_message,
    };

    for slot in 0..generator.locals.len() {
        generator.code.push(Instr::Declare { slot });
    }
    generator.block(&rule.statements);

    Program {
        locals: generator.locals,
        lookups: generator.lookups,
        code: generator.code,
    }
}

struct Generator<'c> {
    locals: Vec<String>,
    lookups: Vec<LookupPlan>,
    code: Vec<Instr>,
    default_message: &'c str,
}

impl Generator<'_> {
    fn block(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Check(node) => {
                let message = self.message_for(node);
                let expr = self.expr(node);
                self.code.push(Instr::Check { expr, message });
            }
            Statement::Assign { var, value } => {
                let slot = self.slot(var);
                let expr = self.expr(value);
                self.code.push(Instr::Assign { slot, expr });
            }
            Statement::Lookup { var, lookup } => {
                let slot = self.slot(var);
                let mut filters = Vec::with_capacity(lookup.predicates.len());
                for predicate in &lookup.predicates {
                    filters.push(LookupFilter {
                        column: predicate.column.clone(),
                        op: filter_op(predicate.op),
                        value: self.expr(&predicate.value),
                    });
                }
                self.lookups.push(LookupPlan {
                    table: lookup.table.clone(),
                    filters,
                    limit: lookup.limit,
                });
                let lookup = self.lookups.len() - 1;
                self.code.push(Instr::Bind { slot, lookup });
            }
            Statement::Return(node) => {
                let message = self.message_for(node);
                let expr = self.expr(node);
                self.code.push(Instr::Return { expr, message });
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let skip_then = self.jump_unless(condition);
                self.block(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.jump();
                        self.patch(skip_then);
                        self.block(else_branch);
                        self.patch(skip_else);
                    }
                    None => self.patch(skip_then),
                }
            }
            Statement::Switch { cases, default, .. } => {
                let mut exits = Vec::with_capacity(cases.len());
                for case in cases {
                    let next = self.jump_unless(&case.condition);
                    self.block(&case.body);
                    exits.push(self.jump());
                    self.patch(next);
                }
                if let Some(default) = default {
                    self.block(default);
                }
                for exit in exits {
                    self.patch(exit);
                }
            }
            Statement::BracketChain {
                arms, fallthrough, ..
            } => {
                for arm in arms {
                    let next = self.jump_unless(&arm.condition);
                    self.block(&arm.body);
                    self.code.push(Instr::Accept);
                    self.patch(next);
                }
                if let Some(fallthrough) = fallthrough {
                    self.block(fallthrough);
                }
            }
        }
    }

    fn jump_unless(&mut self, condition: &ExpressionNode) -> usize {
        let cond = self.expr(condition);
        self.code.push(Instr::JumpUnless { cond, target: 0 });
        self.code.len() - 1
    }

    fn jump(&mut self) -> usize {
        self.code.push(Instr::Jump { target: 0 });
        self.code.len() - 1
    }

    /// Point the jump at `index` to the next instruction emitted
    fn patch(&mut self, index: usize) {
        let here = self.code.len();
        match self.code.get_mut(index) {
            Some(Instr::JumpUnless { target, .. }) | Some(Instr::Jump { target }) => *target = here,
            _ => {}
        }
    }

    fn slot(&mut self, name: &str) -> usize {
        match self.locals.iter().position(|l| l == name) {
            Some(slot) => slot,
            None => {
                self.locals.push(name.to_string());
                self.locals.len() - 1
            }
        }
    }

    fn expr(&mut self, node: &ExpressionNode) -> Expr {
        match node {
            ExpressionNode::Literal(literal) => Expr::Const(literal_value(literal)),
            ExpressionNode::FieldReference(name) => Expr::Field(name.clone()),
            ExpressionNode::LocalVariable(name) => Expr::Local(self.slot(name)),
            ExpressionNode::RowField { var, field } => Expr::RowField {
                slot: self.slot(var),
                column: field.clone(),
            },
            ExpressionNode::SpecialVariable(special) => Expr::Special(*special),
            ExpressionNode::Negate(inner) => Expr::Negate(Box::new(self.expr(inner))),
            ExpressionNode::Arithmetic { op, left, right } => Expr::Arith {
                op: *op,
                left: Box::new(self.expr(left)),
                right: Box::new(self.expr(right)),
            },
            ExpressionNode::Concat { left, right } => {
                Expr::Concat(Box::new(self.expr(left)), Box::new(self.expr(right)))
            }
            ExpressionNode::Compare { op, mode, left, right } => Expr::Compare {
                op: *op,
                mode: *mode,
                left: Box::new(self.expr(left)),
                right: Box::new(self.expr(right)),
            },
            ExpressionNode::Logical { op, left, right } => {
                let left = Box::new(self.expr(left));
                let right = Box::new(self.expr(right));
                match op {
                    LogicOp::And => Expr::And(left, right),
                    LogicOp::Or => Expr::Or(left, right),
                }
            }
            ExpressionNode::Between {
                subject,
                low,
                high,
                negated,
            } => Expr::Between {
                subject: Box::new(self.expr(subject)),
                low: Box::new(self.expr(low)),
                high: Box::new(self.expr(high)),
                negated: *negated,
            },
            ExpressionNode::InSet {
                subject,
                members,
                negated,
            } => {
                let subject = Box::new(self.expr(subject));
                let members = members
                    .iter()
                    .map(|member| match member {
                        SetMember::Value { value, text } => Member::Value {
                            expr: self.expr(value),
                            text: *text,
                        },
                        SetMember::IntRange(lo, hi) => Member::IntRange(*lo, *hi),
                        SetMember::CharRange(lo, hi) => Member::CharRange(*lo, *hi),
                    })
                    .collect();
                Expr::InSet {
                    subject,
                    members,
                    negated: *negated,
                }
            }
            ExpressionNode::FunctionCall { function, args } => Expr::Call {
                function: *function,
                args: args.iter().map(|arg| self.expr(arg)).collect(),
            },
        }
    }

    fn message_for(&self, node: &ExpressionNode) -> String {
        describe(node).unwrap_or_else(|| self.default_message.to_string())
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::Text(t) => Value::from_raw(t),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

fn filter_op(op: CmpOp) -> FilterOp {
    match op {
        CmpOp::Eq => FilterOp::Eq,
        CmpOp::Ne => FilterOp::Ne,
        CmpOp::Lt => FilterOp::Lt,
        CmpOp::Le => FilterOp::Le,
        CmpOp::Gt => FilterOp::Gt,
        CmpOp::Ge => FilterOp::Ge,
    }
}

/// Rejection message implied by the shape of a checked expression
fn describe(node: &ExpressionNode) -> Option<String> {
    match node {
        ExpressionNode::Between {
            low, high, negated, ..
        } => {
            let verb = if *negated { "must not be" } else { "must be" };
            Some(format!("Value {} between {} and {}.", verb, bound(low), bound(high)))
        }
        ExpressionNode::InSet { .. } => Some(ALLOWED_VALUES_MESSAGE.to_string()),
        ExpressionNode::Logical { left, right, .. } => {
            let left = describe(left);
            let right = describe(right);
            let allowed = |m: &Option<String>| m.as_deref() == Some(ALLOWED_VALUES_MESSAGE);
            if allowed(&left) || allowed(&right) {
                Some(ALLOWED_VALUES_MESSAGE.to_string())
            } else {
                right.or(left)
            }
        }
        _ => None,
    }
}

fn bound(node: &ExpressionNode) -> String {
    match node {
        ExpressionNode::Literal(Literal::Number(n)) => format_number(*n),
        ExpressionNode::Literal(Literal::Text(t)) => t.clone(),
        ExpressionNode::Negate(inner) => format!("-{}", bound(inner)),
        other => other.to_string(),
    }
}
