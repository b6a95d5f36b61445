//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Metadata errors (1xxx)
    /// The field is not declared in the data dictionary
    MetadataFieldNotFound,

    /// The table is not declared in the data dictionary
    MetadataTableNotFound,

    /// The coded-value string cannot be decoded
    MetadataMalformedCodes,

    /// A layout directive is missing its required parameter
    MetadataMissingDirectiveParameter,

    /// A layout directive is present but cannot be understood
    MetadataMalformedDirective,

    /// The metadata store itself failed
    MetadataStoreFailure,

    // Syntax errors (2xxx)
    /// A bracket, parenthesis, brace or block was opened and never closed (or closed twice)
    SyntaxUnmatchedBracket,

    /// A single-quoted string runs to the end of the rule
    SyntaxUnterminatedString,

    /// Double quotes are not allowed in rule text
    SyntaxDoubleQuote,

    /// Assignment to something other than a local variable
    SyntaxInvalidAssignment,

    /// Bracket conditionals interleaved with other statements without braces
    SyntaxMalformedTrigger,

    /// Reference to a field that is not declared on the table
    SyntaxUnknownField,

    /// Cross-table lookup against an undeclared table
    SyntaxUnknownTable,

    /// Call to a function that is not built in
    SyntaxUnknownFunction,

    /// Cross-table lookup used outside a local-variable binding, or malformed
    SyntaxInvalidLookup,

    /// Any other token the grammar does not allow at this point
    SyntaxUnexpectedToken,

    // General (9xxx)
    /// The rule was derived from metadata because the rule text is empty
    DefaultRuleDerived,

    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetadataFieldNotFound => "METADATA_FIELD_NOT_FOUND",
            Self::MetadataTableNotFound => "METADATA_TABLE_NOT_FOUND",
            Self::MetadataMalformedCodes => "METADATA_MALFORMED_CODES",
            Self::MetadataMissingDirectiveParameter => "METADATA_MISSING_DIRECTIVE_PARAMETER",
            Self::MetadataMalformedDirective => "METADATA_MALFORMED_DIRECTIVE",
            Self::MetadataStoreFailure => "METADATA_STORE_FAILURE",
            Self::SyntaxUnmatchedBracket => "SYNTAX_UNMATCHED_BRACKET",
            Self::SyntaxUnterminatedString => "SYNTAX_UNTERMINATED_STRING",
            Self::SyntaxDoubleQuote => "SYNTAX_DOUBLE_QUOTE",
            Self::SyntaxInvalidAssignment => "SYNTAX_INVALID_ASSIGNMENT",
            Self::SyntaxMalformedTrigger => "SYNTAX_MALFORMED_TRIGGER",
            Self::SyntaxUnknownField => "SYNTAX_UNKNOWN_FIELD",
            Self::SyntaxUnknownTable => "SYNTAX_UNKNOWN_TABLE",
            Self::SyntaxUnknownFunction => "SYNTAX_UNKNOWN_FUNCTION",
            Self::SyntaxInvalidLookup => "SYNTAX_INVALID_LOOKUP",
            Self::SyntaxUnexpectedToken => "SYNTAX_UNEXPECTED_TOKEN",
            Self::DefaultRuleDerived => "DEFAULT_RULE_DERIVED",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }

    /// Category shown to editors: `metadata`, `syntax` or `general`
    pub fn category(&self) -> &'static str {
        match self {
            Self::MetadataFieldNotFound
            | Self::MetadataTableNotFound
            | Self::MetadataMalformedCodes
            | Self::MetadataMissingDirectiveParameter
            | Self::MetadataMalformedDirective
            | Self::MetadataStoreFailure => "metadata",
            Self::SyntaxUnmatchedBracket
            | Self::SyntaxUnterminatedString
            | Self::SyntaxDoubleQuote
            | Self::SyntaxInvalidAssignment
            | Self::SyntaxMalformedTrigger
            | Self::SyntaxUnknownField
            | Self::SyntaxUnknownTable
            | Self::SyntaxUnknownFunction
            | Self::SyntaxInvalidLookup
            | Self::SyntaxUnexpectedToken => "syntax",
            Self::DefaultRuleDerived | Self::Info | Self::Warning => "general",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - the field has no usable validator
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where in the data dictionary a diagnostic points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Table (form) name
    pub table: String,

    /// Field name
    pub field: String,

    /// Optional byte offset into the rule text
    pub offset: Option<usize>,

    /// Optional end offset (for ranges)
    pub end_offset: Option<usize>,
}

impl Location {
    /// Create a location pointing at a whole field
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            offset: None,
            end_offset: None,
        }
    }

    /// Create a location pointing at an offset within the field's rule text
    pub fn with_offset(table: impl Into<String>, field: impl Into<String>, offset: usize) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            offset: Some(offset),
            end_offset: None,
        }
    }

    /// Set the end of the highlighted range
    pub fn with_end(mut self, end_offset: usize) -> Self {
        self.end_offset = Some(end_offset);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}.{}@{}", self.table, self.field, offset),
            None => write!(f, "{}.{}", self.table, self.field),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Offending fragment of rule text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            fragment: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach the offending fragment
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// Category of the underlying code
    pub fn category(&self) -> &'static str {
        self.code.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::MetadataFieldNotFound.as_str(), "METADATA_FIELD_NOT_FOUND");
        assert_eq!(DiagnosticCode::SyntaxUnmatchedBracket.as_str(), "SYNTAX_UNMATCHED_BRACKET");
    }

    #[test]
    fn categories() {
        assert_eq!(DiagnosticCode::MetadataMalformedCodes.category(), "metadata");
        assert_eq!(DiagnosticCode::SyntaxDoubleQuote.category(), "syntax");
        assert_eq!(DiagnosticCode::DefaultRuleDerived.category(), "general");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::SyntaxUnmatchedBracket,
            Severity::Error,
            "'[' is never closed"
        )
        .with_location(Location::with_offset("vitals", "pulse", 4))
        .with_fragment("[x=n");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("SYNTAX_UNMATCHED_BRACKET"));
        assert!(json.contains("error"));
        assert!(json.contains("\"offset\":4"));
    }

    #[test]
    fn location_display() {
        assert_eq!(Location::new("vitals", "pulse").to_string(), "vitals.pulse");
        assert_eq!(Location::with_offset("vitals", "pulse", 7).to_string(), "vitals.pulse@7");
    }
}
