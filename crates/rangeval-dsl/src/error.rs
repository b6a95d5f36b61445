//! Compilation errors and their diagnostic form

use rangeval_catalog::StoreError;
use rangeval_core::{Diagnostic, DiagnosticCode, Location, Severity};

/// The metadata behind a rule is absent or unusable
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetadataError {
    #[error("Field not found: {table}.{field}")]
    NotFound { table: String, field: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Malformed coded values on {field}: {reason}")]
    MalformedCodes { field: String, reason: String },

    #[error("Directive '{directive}' on {field} is missing its parameter")]
    MissingDirectiveParameter { field: String, directive: String },

    #[error("Malformed directive on {field}: {reason}")]
    MalformedDirective { field: String, reason: String },

    #[error("Metadata store failure: {0}")]
    Store(String),
}

impl MetadataError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::NotFound { .. } => DiagnosticCode::MetadataFieldNotFound,
            Self::TableNotFound(_) => DiagnosticCode::MetadataTableNotFound,
            Self::MalformedCodes { .. } => DiagnosticCode::MetadataMalformedCodes,
            Self::MissingDirectiveParameter { .. } => DiagnosticCode::MetadataMissingDirectiveParameter,
            Self::MalformedDirective { .. } => DiagnosticCode::MetadataMalformedDirective,
            Self::Store(_) => DiagnosticCode::MetadataStoreFailure,
        }
    }
}

impl From<StoreError> for MetadataError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TableNotFound(table) => Self::TableNotFound(table),
            StoreError::FieldNotFound { table, field } => Self::NotFound { table, field },
            other => Self::Store(other.to_string()),
        }
    }
}

/// What kind of mistake the rule text contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    UnmatchedBracket,
    UnterminatedString,
    DoubleQuote,
    InvalidAssignment,
    MalformedTrigger,
    UnknownField,
    UnknownTable,
    UnknownFunction,
    InvalidLookup,
    UnexpectedToken,
}

impl SyntaxErrorKind {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::UnmatchedBracket => DiagnosticCode::SyntaxUnmatchedBracket,
            Self::UnterminatedString => DiagnosticCode::SyntaxUnterminatedString,
            Self::DoubleQuote => DiagnosticCode::SyntaxDoubleQuote,
            Self::InvalidAssignment => DiagnosticCode::SyntaxInvalidAssignment,
            Self::MalformedTrigger => DiagnosticCode::SyntaxMalformedTrigger,
            Self::UnknownField => DiagnosticCode::SyntaxUnknownField,
            Self::UnknownTable => DiagnosticCode::SyntaxUnknownTable,
            Self::UnknownFunction => DiagnosticCode::SyntaxUnknownFunction,
            Self::InvalidLookup => DiagnosticCode::SyntaxInvalidLookup,
            Self::UnexpectedToken => DiagnosticCode::SyntaxUnexpectedToken,
        }
    }
}

/// The rule text is malformed
///
/// `position` is a byte offset into the text that was tokenized (the
/// author's rule, or the derived rule when the field had none).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at position {position})")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub position: usize,
    pub message: String,

    /// Offending fragment of the rule text
    pub fragment: String,
}

impl SyntaxError {
    pub fn new(
        kind: SyntaxErrorKind,
        position: usize,
        message: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
            fragment: fragment.into(),
        }
    }
}

/// Anything that stops a field from compiling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl From<StoreError> for CompileError {
    fn from(error: StoreError) -> Self {
        Self::Metadata(error.into())
    }
}

impl CompileError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Metadata(e) => e.code(),
            Self::Syntax(e) => e.kind.code(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_))
    }

    /// Convert to a diagnostic pointing at `table.field`
    pub fn to_diagnostic(&self, table: &str, field: &str) -> Diagnostic {
        match self {
            Self::Metadata(e) => Diagnostic::new(e.code(), Severity::Error, e.to_string())
                .with_location(Location::new(table, field)),
            Self::Syntax(e) => {
                let end = e.position + e.fragment.len();
                Diagnostic::new(e.kind.code(), Severity::Error, e.message.clone())
                    .with_location(Location::with_offset(table, field, e.position).with_end(end))
                    .with_fragment(e.fragment.clone())
            }
        }
    }
}
