//! Metadata resolution for rule compilation
//!
//! Wraps a [`MetadataStore`] and decodes the raw strings it holds (coded
//! values, layout directives, visibility) into typed values.

use crate::error::MetadataError;
use chrono::NaiveDate;
use rangeval_catalog::MetadataStore;
use rangeval_core::{
    CalcDirective, CalcMode, CodedValue, CodedValues, FieldDefinition, FieldType, LayoutDirectives,
    NumericRange, TableInfo, Trigger, Visibility,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*\.\.\s*(-?\d+(?:\.\d+)?)\s*(?::\s*(\d+(?:\.\d+)?))?\s*$").ok()
        })
        .as_ref()
}

fn trigger_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(\S.*)$").ok())
        .as_ref()
}

/// The question that decides whether a subquestion applies
#[derive(Debug, Clone, PartialEq)]
pub enum Controller {
    /// A single field
    Field(FieldDefinition),

    /// A group of binary checkboxes; any one checked opens the subquestion
    CheckboxGroup { group: String, members: Vec<String> },
}

/// Typed view over a metadata store
pub struct Resolver<'a> {
    store: &'a dyn MetadataStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn MetadataStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a dyn MetadataStore {
        self.store
    }

    /// Field definition for `table.field`
    pub fn resolve(&self, table: &str, field: &str) -> Result<FieldDefinition, MetadataError> {
        if !self.store.table_exists(table) {
            return Err(MetadataError::TableNotFound(table.to_string()));
        }
        Ok(self.store.field_definition(table, field)?)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.store.table_exists(table)
    }

    pub fn field_exists(&self, table: &str, field: &str) -> bool {
        self.store.field_exists(table, field)
    }

    /// A declared field, or an index/row-id/visit column of the table
    ///
    /// Rules may read structural columns the dictionary does not list as fields.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.field_exists(table, column)
            || self
                .store
                .table_info(table)
                .map(|info| info.structural_columns().contains(&column))
                .unwrap_or(false)
    }

    pub fn table_info(&self, table: &str) -> Result<TableInfo, MetadataError> {
        Ok(self.store.table_info(table)?)
    }

    pub fn table_fields(&self, table: &str) -> Result<Vec<FieldDefinition>, MetadataError> {
        Ok(self.store.table_fields(table)?)
    }

    pub fn table_index_columns(&self, table: &str) -> Result<Vec<String>, MetadataError> {
        Ok(self.store.table_index_columns(table)?)
    }

    /// Decode a field's coded values
    ///
    /// `1=Yes;0=No` gives discrete codes in declaration order; `1..5` or
    /// `0..10:0.5` gives a numeric range. Empty segments are ignored.
    pub fn coded_values(&self, definition: &FieldDefinition) -> Result<CodedValues, MetadataError> {
        let raw = definition.codes.trim();
        if raw.is_empty() {
            return Ok(CodedValues::None);
        }

        let malformed = |reason: String| MetadataError::MalformedCodes {
            field: definition.qualified_name(),
            reason,
        };

        if let Some(captures) = range_pattern().and_then(|p| p.captures(raw)) {
            let number = |index: usize| -> Option<f64> {
                captures.get(index).and_then(|m| m.as_str().parse::<f64>().ok())
            };
            let (Some(min), Some(max)) = (number(1), number(2)) else {
                return Err(malformed(format!("unreadable range '{}'", raw)));
            };
            if min > max {
                return Err(malformed(format!("range '{}' has min above max", raw)));
            }
            let step = number(3);
            if step.is_some_and(|s| s <= 0.0) {
                return Err(malformed(format!("range '{}' needs a positive step", raw)));
            }
            return Ok(CodedValues::Range(NumericRange { min, max, step }));
        }

        let mut codes: Vec<CodedValue> = Vec::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((value, label)) = segment.split_once('=') else {
                return Err(malformed(format!("'{}' is not value=label", segment)));
            };
            let value = value.trim();
            if value.is_empty() {
                return Err(malformed(format!("'{}' has an empty value", segment)));
            }
            if codes.iter().any(|c| c.value == value) {
                return Err(malformed(format!("value '{}' is listed twice", value)));
            }
            codes.push(CodedValue {
                value: value.to_string(),
                label: label.trim().to_string(),
            });
        }

        if codes.is_empty() {
            return Ok(CodedValues::None);
        }
        Ok(CodedValues::Discrete(codes))
    }

    /// Decode a field's layout directive string
    ///
    /// Directives the compiler does not act on (rendering hints) are ignored.
    pub fn layout(&self, definition: &FieldDefinition) -> Result<LayoutDirectives, MetadataError> {
        let field = definition.qualified_name();
        let mut directives = LayoutDirectives::default();

        for entry in definition.layout.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, parameter) = match entry.split_once('=') {
                Some((key, parameter)) => (key.trim().to_ascii_lowercase(), Some(parameter.trim())),
                None => (entry.to_ascii_lowercase(), None),
            };
            let parameter = parameter.filter(|p| !p.is_empty());

            let required = |directive: &str| required_parameter(parameter, &field, directive);

            match key.as_str() {
                "trigger" => directives.trigger = Some(parse_trigger(&field, required("trigger")?)?),
                "missingtrigger" => {
                    directives.missing_trigger = Some(parse_trigger(&field, required("missingtrigger")?)?)
                }
                "checkbox" => directives.checkbox_group = Some(required("checkbox")?.to_string()),
                "letpass" => {
                    let raw = required("letpass")?;
                    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                        MetadataError::MalformedDirective {
                            field: field.clone(),
                            reason: format!("letpass date '{}' is not YYYY-MM-DD", raw),
                        }
                    })?;
                    directives.let_pass = Some(date);
                }
                "calc" => directives.calc = Some(parse_calc(&field, required("calc")?)?),
                "strict" => directives.strict = true,
                "password" => directives.password = true,
                "militarytime" => directives.military_time = true,
                other => tracing::trace!(field = %field, directive = other, "ignoring layout hint"),
            }
        }

        Ok(directives)
    }

    /// Decode a field's visibility string
    pub fn visibility(&self, definition: &FieldDefinition) -> Visibility {
        let raw = definition.visibility.trim();
        if raw.is_empty() {
            return Visibility::Always;
        }
        if raw.eq_ignore_ascii_case("hidden") {
            return Visibility::Hidden;
        }
        if let Some(visits) = raw.strip_prefix("visits:") {
            return Visibility::Visits(split_values(visits));
        }
        Visibility::When(raw.to_string())
    }

    /// Binary checkbox groups of a table, keyed by their last member
    ///
    /// Members are collected in form order from the `checkbox=<group>`
    /// directive of checkbox fields.
    pub fn binary_checkbox_groups(
        &self,
        table: &str,
    ) -> Result<BTreeMap<String, (String, Vec<String>)>, MetadataError> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();

        for definition in self.table_fields(table)? {
            if definition.field_type != FieldType::Checkbox {
                continue;
            }
            let Some(group) = self.layout(&definition)?.checkbox_group else {
                continue;
            };
            match groups.iter_mut().find(|(name, _)| *name == group) {
                Some((_, members)) => members.push(definition.field.clone()),
                None => groups.push((group, vec![definition.field.clone()])),
            }
        }

        Ok(groups
            .into_iter()
            .filter_map(|(group, members)| {
                let last = members.last()?.clone();
                Some((last, (group, members)))
            })
            .collect())
    }

    /// Nearest preceding field with a smaller indent
    ///
    /// When that field closes a binary checkbox group, the whole group is the
    /// controller.
    pub fn dependent_field(
        &self,
        table: &str,
        field: &str,
        indent: u32,
    ) -> Result<Option<Controller>, MetadataError> {
        if indent == 0 {
            return Ok(None);
        }

        let fields = self.table_fields(table)?;
        let Some(index) = fields.iter().position(|f| f.field == field) else {
            return Err(MetadataError::NotFound {
                table: table.to_string(),
                field: field.to_string(),
            });
        };

        let Some(parent) = fields[..index].iter().rev().find(|f| f.indent < indent) else {
            return Ok(None);
        };

        let groups = self.binary_checkbox_groups(table)?;
        if let Some((group, members)) = groups.get(&parent.field) {
            return Ok(Some(Controller::CheckboxGroup {
                group: group.clone(),
                members: members.clone(),
            }));
        }

        Ok(Some(Controller::Field(parent.clone())))
    }
}

fn required_parameter<'p>(
    parameter: Option<&'p str>,
    field: &str,
    directive: &str,
) -> Result<&'p str, MetadataError> {
    parameter.ok_or_else(|| MetadataError::MissingDirectiveParameter {
        field: field.to_string(),
        directive: directive.to_string(),
    })
}

fn split_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_trigger(field: &str, raw: &str) -> Result<Trigger, MetadataError> {
    let captures = trigger_pattern()
        .and_then(|p| p.captures(raw))
        .ok_or_else(|| MetadataError::MalformedDirective {
            field: field.to_string(),
            reason: format!("trigger '{}' is not <field>:<values>", raw),
        })?;

    let values = split_values(captures.get(2).map(|m| m.as_str()).unwrap_or_default());
    if values.is_empty() {
        return Err(MetadataError::MalformedDirective {
            field: field.to_string(),
            reason: format!("trigger '{}' lists no values", raw),
        });
    }

    Ok(Trigger {
        field: captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        values,
    })
}

fn parse_calc(field: &str, raw: &str) -> Result<CalcDirective, MetadataError> {
    let missing = || MetadataError::MissingDirectiveParameter {
        field: field.to_string(),
        directive: "calc".to_string(),
    };

    let (mode, name) = raw.split_once(':').ok_or_else(missing)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(missing());
    }

    let mode = match mode.trim().to_ascii_lowercase().as_str() {
        "insert" => CalcMode::Insert,
        "compare" => CalcMode::Compare,
        other => {
            return Err(MetadataError::MalformedDirective {
                field: field.to_string(),
                reason: format!("unknown calc mode '{}'", other),
            })
        }
    };

    Ok(CalcDirective {
        mode,
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rangeval_catalog::InMemoryStore;

    fn store() -> InMemoryStore {
        InMemoryStore::builder()
            .with_table(TableInfo::new("symptoms").with_index_columns(&["subjid", "visitno"]))
            .with_field(FieldDefinition::new("symptoms", "subjid", FieldType::Text).with_admin(true))
            .with_field(FieldDefinition::new("symptoms", "cough", FieldType::Checkbox).with_layout("checkbox=sx"))
            .with_field(FieldDefinition::new("symptoms", "fever", FieldType::Checkbox).with_layout("checkbox=sx"))
            .with_field(FieldDefinition::new("symptoms", "other", FieldType::Text).with_indent(1))
            .with_field(FieldDefinition::new("symptoms", "smoker", FieldType::Radio).with_codes("1=Yes;0=No"))
            .with_field(FieldDefinition::new("symptoms", "packs", FieldType::Integer).with_indent(1))
            .with_field(FieldDefinition::new("symptoms", "brand", FieldType::Text).with_indent(2))
            .build()
    }

    #[test]
    fn structural_columns_are_columns() {
        let store = store();
        let resolver = Resolver::new(&store);

        assert!(resolver.has_column("symptoms", "cough"));
        assert!(resolver.has_column("symptoms", "visitno"));
        assert!(!resolver.field_exists("symptoms", "visitno"));
        assert!(!resolver.has_column("symptoms", "weight"));
        assert!(!resolver.has_column("labs", "visitno"));
    }

    #[test]
    fn discrete_codes() {
        let store = store();
        let resolver = Resolver::new(&store);
        let def = FieldDefinition::new("t", "f", FieldType::Radio).with_codes("1=Yes; 0=No;");

        let codes = resolver.coded_values(&def).unwrap();
        assert_eq!(codes.values(), vec!["1", "0"]);
    }

    #[test]
    fn range_codes() {
        let store = store();
        let resolver = Resolver::new(&store);
        let def = FieldDefinition::new("t", "f", FieldType::Decimal).with_codes("0..10:0.5");

        assert_eq!(
            resolver.coded_values(&def).unwrap(),
            CodedValues::Range(NumericRange { min: 0.0, max: 10.0, step: Some(0.5) })
        );
    }

    #[test]
    fn malformed_codes() {
        let store = store();
        let resolver = Resolver::new(&store);

        for codes in ["1=Yes;No", "=Yes", "1=Yes;1=Again", "5..1"] {
            let def = FieldDefinition::new("t", "f", FieldType::Radio).with_codes(codes);
            assert!(
                matches!(resolver.coded_values(&def), Err(MetadataError::MalformedCodes { .. })),
                "{} should be malformed",
                codes
            );
        }
    }

    #[test]
    fn layout_directives() {
        let store = store();
        let resolver = Resolver::new(&store);
        let def = FieldDefinition::new("t", "f", FieldType::Text)
            .with_layout("trigger=smoker:1,2; letpass=2024-06-30; calc=compare:bmi; strict; width=40");

        let layout = resolver.layout(&def).unwrap();
        assert_eq!(
            layout.trigger,
            Some(Trigger { field: "smoker".into(), values: vec!["1".into(), "2".into()] })
        );
        assert_eq!(layout.let_pass, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(layout.calc.map(|c| c.mode), Some(CalcMode::Compare));
        assert!(layout.strict);
        assert!(!layout.password);
    }

    #[test]
    fn directive_missing_parameter() {
        let store = store();
        let resolver = Resolver::new(&store);

        for layout in ["calc=insert", "calc", "trigger=", "checkbox"] {
            let def = FieldDefinition::new("t", "f", FieldType::Text).with_layout(layout);
            assert!(
                matches!(resolver.layout(&def), Err(MetadataError::MissingDirectiveParameter { .. })),
                "{} should be missing its parameter",
                layout
            );
        }

        let def = FieldDefinition::new("t", "f", FieldType::Text).with_layout("letpass=June");
        assert!(matches!(resolver.layout(&def), Err(MetadataError::MalformedDirective { .. })));
    }

    #[test]
    fn visibility_forms() {
        let store = store();
        let resolver = Resolver::new(&store);
        let def = |v: &str| FieldDefinition::new("t", "f", FieldType::Text).with_visibility(v);

        assert_eq!(resolver.visibility(&def("")), Visibility::Always);
        assert_eq!(resolver.visibility(&def("hidden")), Visibility::Hidden);
        assert_eq!(
            resolver.visibility(&def("visits:1, 2")),
            Visibility::Visits(vec!["1".into(), "2".into()])
        );
        assert_eq!(
            resolver.visibility(&def("smoker = 1")),
            Visibility::When("smoker = 1".into())
        );
    }

    #[test]
    fn checkbox_groups_keyed_by_last_member() {
        let store = store();
        let resolver = Resolver::new(&store);
        let groups = resolver.binary_checkbox_groups("symptoms").unwrap();

        assert_eq!(
            groups.get("fever"),
            Some(&("sx".to_string(), vec!["cough".to_string(), "fever".to_string()]))
        );
        assert!(groups.get("cough").is_none());
    }

    #[test]
    fn dependent_fields() {
        let store = store();
        let resolver = Resolver::new(&store);

        assert_eq!(
            resolver.dependent_field("symptoms", "other", 1).unwrap(),
            Some(Controller::CheckboxGroup {
                group: "sx".into(),
                members: vec!["cough".into(), "fever".into()],
            })
        );

        match resolver.dependent_field("symptoms", "brand", 2).unwrap() {
            Some(Controller::Field(def)) => assert_eq!(def.field, "packs"),
            other => panic!("unexpected controller {:?}", other),
        }

        match resolver.dependent_field("symptoms", "packs", 1).unwrap() {
            Some(Controller::Field(def)) => assert_eq!(def.field, "smoker"),
            other => panic!("unexpected controller {:?}", other),
        }

        assert_eq!(resolver.dependent_field("symptoms", "smoker", 0).unwrap(), None);
    }

    #[test]
    fn unknown_table() {
        let store = store();
        let resolver = Resolver::new(&store);
        assert_eq!(
            resolver.resolve("labs", "alt"),
            Err(MetadataError::TableNotFound("labs".into()))
        );
    }
}
