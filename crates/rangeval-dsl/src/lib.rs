//! Rule language front end
//!
//! This crate handles:
//! - Resolving field metadata (coded values, layout directives, visibility)
//! - Deriving default rules for fields without one
//! - Tokenizing and normalizing rule text
//! - Parsing rule text into a syntax tree, with diagnostics on failure

pub mod ast;
pub mod context;
pub mod defaults;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod state;

pub use ast::{
    ArithOp, Arm, CaseLabel, CmpOp, CompareMode, CrossTableLookup, ExpressionNode, Literal, LogicOp,
    LookupPredicate, Rule, SetMember, SpecialVar, Statement, SwitchCase,
};
pub use context::CompilationContext;
pub use defaults::{DefaultPolicy, DerivedRule, PolicyStep};
pub use error::{CompileError, MetadataError, SyntaxError, SyntaxErrorKind};
pub use functions::Builtin;
pub use lexer::{normalize, tokenize, Keyword, Lexeme, TokenKind};
pub use parser::parse;
pub use resolver::{Controller, Resolver};
pub use state::{ParseStack, ParseState};
