//! rangeval core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod field;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use field::{
    FieldType, FieldDefinition, TableInfo, CodedValue, CodedValues, NumericRange, Visibility,
    Trigger, CalcMode, CalcDirective, LayoutDirectives,
};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, CompilerConfig, LookupConfig, Sentinels, SeverityThreshold, SkipRules};
