//! Configuration schema (rangeval.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Reserved response values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    /// "Collected but unreadable"
    #[serde(default = "default_missing")]
    pub missing: String,

    /// "Question does not apply"
    #[serde(default = "default_not_applicable")]
    pub not_applicable: String,
}

fn default_missing() -> String {
    "-9".to_string()
}

fn default_not_applicable() -> String {
    "-8".to_string()
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            missing: default_missing(),
            not_applicable: default_not_applicable(),
        }
    }
}

/// Knobs for the compiler and the default-policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Message used when a check fails without a more specific one
    #[serde(default = "default_message")]
    pub default_message: String,

    /// Field names treated as administrative on every table
    #[serde(default)]
    pub admin_fields: Vec<String>,

    /// Answers of a controlling question that open an indented subquestion
    #[serde(default = "default_indent_trigger_values")]
    pub indent_trigger_values: Vec<String>,

    /// Minimum length enforced on password fields
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
}

fn default_message() -> String {
    "Invalid response.".to_string()
}

fn default_indent_trigger_values() -> Vec<String> {
    vec!["1".to_string()]
}

fn default_password_min_length() -> usize {
    6
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_message: default_message(),
            admin_fields: Vec::new(),
            indent_trigger_values: default_indent_trigger_values(),
            password_min_length: default_password_min_length(),
        }
    }
}

impl CompilerConfig {
    pub fn is_admin_field(&self, field: &str) -> bool {
        self.admin_fields.iter().any(|f| f == field)
    }
}

/// Cross-table lookup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Per-lookup timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    pub overrides: HashMap<String, Severity>,
}

impl Default for SeverityThreshold {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Fields left out of batch checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipRules {
    /// `table.field` glob patterns
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SkipRules {
    /// Check if `table.field` matches any skip pattern
    pub fn is_skipped(&self, table: &str, field: &str) -> bool {
        let name = format!("{}.{}", table, field);
        self.fields.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, &name)
            } else {
                pattern == &name
            }
        })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sentinels: Sentinels,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    #[serde(default)]
    pub skip: SkipRules,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sentinels: Sentinels::default(),
            compiler: CompilerConfig::default(),
            lookup: LookupConfig::default(),
            severity: SeverityThreshold::default(),
            skip: SkipRules::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Simple glob matching (supports a single *)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
