//! rangeval engine - rule compilation and evaluation
//!
//! This crate turns parsed rules into executable validators:
//! - Code generation into a flat instruction program
//! - Evaluation against a validation context, with async cross-table lookups
//! - The compile pipeline (resolve, derive, parse, generate, digest)

pub mod builtins;
pub mod codegen;
pub mod compiler;
pub mod context;
pub mod program;
pub mod validator;
pub mod value;

pub use codegen::{generate, ALLOWED_VALUES_MESSAGE};
pub use compiler::{Compiler, Explanation, RuleSource};
pub use context::{ContextFile, ValidationContext};
pub use program::{Expr, Instr, LookupFilter, LookupPlan, Member, Program};
pub use validator::{CompiledValidator, Verdict};
pub use value::Value;
