//! Field definitions and the metadata vocabulary around them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Declared type of a case-report-form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Single-line free text
    Text,

    /// Multi-line free text
    Paragraph,

    /// Whole number
    Integer,

    /// Number with a decimal precision
    Decimal,

    /// Calendar date (YYYY-MM-DD)
    Date,

    /// Time of day (HH:MM, 24-hour)
    Time,

    /// Radio buttons over coded values
    Radio,

    /// Drop-down over coded values
    Select,

    /// Binary checkbox (0/1)
    Checkbox,

    /// File upload
    File,

    /// Masked text entry
    Password,
}

impl FieldType {
    /// Free-text types accept anything unless marked strict
    pub fn is_free_text(&self) -> bool {
        matches!(self, Self::Text | Self::Paragraph | Self::Password)
    }

    /// Numeric types compare numerically against range codes
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }
}

impl Default for FieldType {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Paragraph => "paragraph",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Time => "time",
            Self::Radio => "radio",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::File => "file",
            Self::Password => "password",
        };
        write!(f, "{}", name)
    }
}

/// One field of one table in the data dictionary
///
/// Immutable once loaded; the metadata store owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Table (form) name; filled in from the enclosing table when loaded from a dictionary
    #[serde(default)]
    pub table: String,

    /// Field name
    pub field: String,

    /// Declared type
    #[serde(default, rename = "type")]
    pub field_type: FieldType,

    /// Decimal places allowed (decimal fields)
    #[serde(default)]
    pub decimals: Option<u32>,

    /// Raw coded values: `1=Yes;0=No` or `min..max[:step]`
    #[serde(default)]
    pub codes: String,

    /// Visibility expression: empty, `hidden`, `visits:1,2` or a rule condition
    #[serde(default)]
    pub visibility: String,

    /// Layout directive string (`;` separated)
    #[serde(default)]
    pub layout: String,

    /// Indent depth on the form
    #[serde(default)]
    pub indent: u32,

    /// Administrative fields (keys, audit columns) are exempt from default rules
    #[serde(default)]
    pub admin: bool,

    /// Author-written rule text; empty means "derive from metadata"
    #[serde(default)]
    pub rangeval: String,
}

impl FieldDefinition {
    /// Create a new text field with no metadata
    pub fn new(table: impl Into<String>, field: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            field_type,
            decimals: None,
            codes: String::new(),
            visibility: String::new(),
            layout: String::new(),
            indent: 0,
            admin: false,
            rangeval: String::new(),
        }
    }

    pub fn with_codes(mut self, codes: impl Into<String>) -> Self {
        self.codes = codes.into();
        self
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_visibility(mut self, visibility: impl Into<String>) -> Self {
        self.visibility = visibility.into();
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn with_indent(mut self, indent: u32) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_rangeval(mut self, rangeval: impl Into<String>) -> Self {
        self.rangeval = rangeval.into();
        self
    }

    /// `table.field`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.field)
    }

    /// True when the author left the rule blank
    pub fn has_empty_rule(&self) -> bool {
        self.rangeval.trim().is_empty()
    }
}

/// Table-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table (form) name
    pub name: String,

    /// Columns that identify one record (subject, visit, ...)
    #[serde(default)]
    pub index_columns: Vec<String>,

    /// Repeating-row form
    #[serde(default)]
    pub log_form: bool,

    /// Row identifier column for log forms; negative ids mark pending deletion
    #[serde(default)]
    pub row_id_column: Option<String>,

    /// Column holding the visit number
    #[serde(default)]
    pub visit_column: Option<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_columns: Vec::new(),
            log_form: false,
            row_id_column: None,
            visit_column: None,
        }
    }

    pub fn with_index_columns(mut self, columns: &[&str]) -> Self {
        self.index_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_log_form(mut self, row_id_column: impl Into<String>) -> Self {
        self.log_form = true;
        self.row_id_column = Some(row_id_column.into());
        self
    }

    pub fn with_visit_column(mut self, column: impl Into<String>) -> Self {
        self.visit_column = Some(column.into());
        self
    }

    /// Index, row-id and visit columns; present on every record even when
    /// the dictionary lists no field for them
    pub fn structural_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.index_columns.iter().map(String::as_str).collect();
        for column in [&self.row_id_column, &self.visit_column].into_iter().flatten() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
        columns
    }
}

/// One enumerated legal value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodedValue {
    pub value: String,
    pub label: String,
}

/// Numeric range shorthand `min..max[:step]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
}

/// Decoded coded values of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CodedValues {
    /// No codes declared
    None,

    /// Ordered `value=label` pairs
    Discrete(Vec<CodedValue>),

    /// Numeric range with optional step
    Range(NumericRange),
}

impl CodedValues {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Values of discrete codes, in declaration order
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Discrete(codes) => codes.iter().map(|c| c.value.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// How a field's visibility affects not-applicable responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Always shown
    Always,

    /// Never shown on the form
    Hidden,

    /// Shown only at the listed visits
    Visits(Vec<String>),

    /// Shown while the rule condition holds
    When(String),
}

/// A dependency on another field's answer: `<field>:<v1,v2>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub field: String,
    pub values: Vec<String>,
}

/// Calculation-service directive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcMode {
    /// The service writes the value; visibility and log-form exemptions do not apply
    Insert,

    /// The service only compares against the entered value
    Compare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcDirective {
    pub mode: CalcMode,
    pub name: String,
}

/// Decoded layout directive string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutDirectives {
    /// `trigger=<field>:<values>`
    pub trigger: Option<Trigger>,

    /// `missingtrigger=<field>:<values>`
    pub missing_trigger: Option<Trigger>,

    /// `checkbox=<group>`
    pub checkbox_group: Option<String>,

    /// `letpass=<date>`
    pub let_pass: Option<NaiveDate>,

    /// `calc=<mode>:<name>`
    pub calc: Option<CalcDirective>,

    /// `strict`: free text is validated like any other field
    pub strict: bool,

    /// `password`
    pub password: bool,

    /// `militarytime`
    pub military_time: bool,
}

impl LayoutDirectives {
    /// Any marker that makes a free-text field take part in dependency rules
    pub fn has_dependency_marker(&self) -> bool {
        self.trigger.is_some() || self.missing_trigger.is_some() || self.checkbox_group.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::Paragraph.to_string(), "paragraph");
        assert!(FieldType::Password.is_free_text());
        assert!(FieldType::Decimal.is_numeric());
        assert!(!FieldType::Radio.is_numeric());
    }

    #[test]
    fn field_definition_builder() {
        let def = FieldDefinition::new("vitals", "pulse", FieldType::Integer)
            .with_codes("30..200")
            .with_indent(1);

        assert_eq!(def.qualified_name(), "vitals.pulse");
        assert_eq!(def.indent, 1);
        assert!(def.has_empty_rule());
        assert!(!def.clone().with_rangeval("between 1 and 5").has_empty_rule());
    }

    #[test]
    fn field_definition_deserializes_with_defaults() {
        let def: FieldDefinition = serde_json::from_str(
            r#"{"table": "demo", "field": "sex", "type": "radio", "codes": "1=Male;2=Female"}"#,
        )
        .unwrap();

        assert_eq!(def.field_type, FieldType::Radio);
        assert_eq!(def.indent, 0);
        assert!(def.layout.is_empty());
    }

    #[test]
    fn structural_columns() {
        let info = TableInfo::new("ae")
            .with_index_columns(&["subjid", "visitno"])
            .with_log_form("aeid")
            .with_visit_column("visitno");
        assert_eq!(info.structural_columns(), vec!["subjid", "visitno", "aeid"]);
        assert!(TableInfo::new("plain").structural_columns().is_empty());
    }

    #[test]
    fn coded_values_listing() {
        let codes = CodedValues::Discrete(vec![
            CodedValue { value: "1".into(), label: "Yes".into() },
            CodedValue { value: "0".into(), label: "No".into() },
        ]);
        assert_eq!(codes.values(), vec!["1", "0"]);
        assert!(CodedValues::None.is_none());
    }
}
