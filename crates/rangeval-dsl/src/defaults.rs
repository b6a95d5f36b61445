//! Default rules for fields the author left blank
//!
//! Builds rule text from metadata alone. The result goes through the same
//! tokenizer and parser as hand-written rules, so a derived rule can be read,
//! logged and explained like any other.
//!
//! Bracket prefixes are emitted in a fixed order (let-pass, missing trigger,
//! visibility, log-form row, dependency, base arms) followed by one body
//! expression. The first bracket whose condition holds decides the outcome.

use crate::error::MetadataError;
use crate::resolver::{Controller, Resolver};
use rangeval_core::{
    CalcMode, CompilerConfig, FieldDefinition, FieldType, LayoutDirectives, Visibility,
};
use std::fmt;

/// Which policy steps contributed to a derived rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyStep {
    Admin,
    LetPass,
    MissingTrigger,
    CalcInsert,
    Visibility,
    LogForm,
    FileType,
    FreeText,
    Dependency,
    CheckboxGroup,
    BaseRule,
}

impl fmt::Display for PolicyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admin => "admin",
            Self::LetPass => "letpass",
            Self::MissingTrigger => "missingtrigger",
            Self::CalcInsert => "calc-insert",
            Self::Visibility => "visibility",
            Self::LogForm => "log-form",
            Self::FileType => "file",
            Self::FreeText => "free-text",
            Self::Dependency => "dependency",
            Self::CheckboxGroup => "checkbox-group",
            Self::BaseRule => "base",
        };
        write!(f, "{}", name)
    }
}

/// Rule text derived from metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRule {
    pub text: String,
    pub steps: Vec<PolicyStep>,
}

/// What opens a dependent question
enum Dependency {
    Field { field: String, values: Vec<String> },
    Group { members: Vec<String> },
}

impl Dependency {
    fn condition(&self) -> String {
        match self {
            Self::Field { field, values } => format!("{} in ({})", field, set_list(values)),
            Self::Group { members } => {
                let checks: Vec<String> = members.iter().map(|m| format!("{} == 1", m)).collect();
                format!("({})", checks.join(" or "))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Field { field, values } => format!("{} is {}", field, values.join(" or ")),
            Self::Group { members } => format!("one of {} is checked", members.join(", ")),
        }
    }
}

/// Derives rule text for fields with an empty rule
pub struct DefaultPolicy<'a> {
    resolver: &'a Resolver<'a>,
    config: &'a CompilerConfig,
}

impl<'a> DefaultPolicy<'a> {
    pub fn new(resolver: &'a Resolver<'a>, config: &'a CompilerConfig) -> Self {
        Self { resolver, config }
    }

    pub fn derive(&self, definition: &FieldDefinition) -> Result<DerivedRule, MetadataError> {
        let mut steps = Vec::new();

        if definition.admin || self.config.is_admin_field(&definition.field) {
            steps.push(PolicyStep::Admin);
            return Ok(DerivedRule {
                text: "true".to_string(),
                steps,
            });
        }

        let table = definition.table.as_str();
        let layout = self.resolver.layout(definition)?;
        let mut arms: Vec<String> = Vec::new();

        if let Some(date) = layout.let_pass {
            steps.push(PolicyStep::LetPass);
            arms.push(format!("[today() <= '{}': true]", date.format("%Y-%m-%d")));
        }

        if let Some(trigger) = &layout.missing_trigger {
            self.resolver.resolve(table, &trigger.field)?;
            steps.push(PolicyStep::MissingTrigger);
            let values = set_list(&trigger.values);
            let described = trigger.values.join(" or ");
            arms.push(format!("[{} in ({}) and x == n: true]", trigger.field, values));
            arms.push(format!(
                "[{} in ({}): {}]",
                trigger.field,
                values,
                quote(&format!("Response must be not applicable when {} is {}.", trigger.field, described))
            ));
            arms.push(format!(
                "[x == n: {}]",
                quote(&format!("Not applicable is only allowed when {} is {}.", trigger.field, described))
            ));
        }

        let calc_insert = matches!(&layout.calc, Some(calc) if calc.mode == CalcMode::Insert);
        if calc_insert {
            steps.push(PolicyStep::CalcInsert);
        } else {
            if let Some(arm) = self.visibility_arm(definition)? {
                steps.push(PolicyStep::Visibility);
                arms.push(arm);
            }

            let info = self.resolver.table_info(table)?;
            if info.log_form {
                let row_id = info.row_id_column.ok_or_else(|| MetadataError::MalformedDirective {
                    field: definition.qualified_name(),
                    reason: format!("log form '{}' has no row id column", table),
                })?;
                steps.push(PolicyStep::LogForm);
                arms.push(format!("[{} < 0 and x == n: true]", row_id));
            }
        }

        if definition.field_type == FieldType::File {
            steps.push(PolicyStep::FileType);
            return Ok(finish(arms, "true".to_string(), steps));
        }

        let dependency = self.dependency(definition, &layout)?;
        let free_text = definition.field_type.is_free_text() && !layout.strict;

        if free_text && dependency.is_none() && !layout.has_dependency_marker() {
            steps.push(PolicyStep::FreeText);
            let (extra, body) = self.free_text_rule(&layout);
            arms.extend(extra);
            return Ok(finish(arms, body, steps));
        }

        if let Some(dependency) = &dependency {
            steps.push(PolicyStep::Dependency);
            let condition = dependency.condition();
            arms.push(format!("[not({}) and x == n: true]", condition));
            arms.push(format!(
                "[not({}): {}]",
                condition,
                quote(&format!("Response must be not applicable unless {}.", dependency.describe()))
            ));
            arms.push("[x == n: 'Response required.']".to_string());
        }

        steps.push(PolicyStep::BaseRule);
        let (base_arms, body) = if free_text {
            self.free_text_rule(&layout)
        } else {
            self.base_rule(definition)?
        };
        arms.extend(base_arms);

        if let Some(arm) = self.checkbox_group_arm(definition, &layout)? {
            steps.push(PolicyStep::CheckboxGroup);
            arms.push(arm);
        }

        Ok(finish(arms, body, steps))
    }

    fn visibility_arm(&self, definition: &FieldDefinition) -> Result<Option<String>, MetadataError> {
        let arm = match self.resolver.visibility(definition) {
            Visibility::Always => None,
            Visibility::Hidden => Some("[x == n: true]".to_string()),
            Visibility::Visits(visits) => {
                let info = self.resolver.table_info(&definition.table)?;
                let column = info.visit_column.ok_or_else(|| MetadataError::MalformedDirective {
                    field: definition.qualified_name(),
                    reason: format!("visit visibility on '{}' which has no visit column", definition.table),
                })?;
                Some(format!("[{} notin ({}) and x == n: true]", column, set_list(&visits)))
            }
            Visibility::When(condition) => Some(format!("[x == n and not({}): true]", condition)),
        };
        Ok(arm)
    }

    fn dependency(
        &self,
        definition: &FieldDefinition,
        layout: &LayoutDirectives,
    ) -> Result<Option<Dependency>, MetadataError> {
        if let Some(trigger) = &layout.trigger {
            self.resolver.resolve(&definition.table, &trigger.field)?;
            return Ok(Some(Dependency::Field {
                field: trigger.field.clone(),
                values: trigger.values.clone(),
            }));
        }

        let controller = self
            .resolver
            .dependent_field(&definition.table, &definition.field, definition.indent)?;

        Ok(controller.map(|controller| match controller {
            Controller::Field(parent) => Dependency::Field {
                field: parent.field,
                values: self.config.indent_trigger_values.clone(),
            },
            Controller::CheckboxGroup { members, .. } => Dependency::Group { members },
        }))
    }

    fn free_text_rule(&self, layout: &LayoutDirectives) -> (Vec<String>, String) {
        let mut arms = Vec::new();

        if layout.password {
            let min = self.config.password_min_length;
            arms.push("[x == m: true]".to_string());
            arms.push(format!(
                "[len(x) < {}: 'Password must be at least {} characters.']",
                min, min
            ));
        } else if layout.military_time {
            arms.push("[x == m or x == n: true]".to_string());
            arms.push("[not(istime(x)): 'Time must be in 24-hour HH:MM format.']".to_string());
        }

        (arms, "true".to_string())
    }

    fn base_rule(&self, definition: &FieldDefinition) -> Result<(Vec<String>, String), MetadataError> {
        let required = "[x == n: 'Field is required.']".to_string();
        let codes = self.resolver.coded_values(definition)?;

        if !codes.is_none() {
            return Ok((vec![required], "in (c, m)".to_string()));
        }

        let rule = match definition.field_type {
            FieldType::Checkbox => (vec![required], "in (0, 1, m)".to_string()),
            FieldType::Date => (
                vec![
                    required,
                    "[x == m: true]".to_string(),
                    "[not(isdate(x)): 'Invalid date.']".to_string(),
                    "[x > today(): 'Date cannot be in the future.']".to_string(),
                ],
                "true".to_string(),
            ),
            FieldType::Time => (
                vec![
                    required,
                    "[x == m: true]".to_string(),
                    "[not(istime(x)): 'Time must be in 24-hour HH:MM format.']".to_string(),
                ],
                "true".to_string(),
            ),
            FieldType::Integer | FieldType::Decimal => {
                let mut arms = vec![
                    required,
                    "[x == m: true]".to_string(),
                    "[not(isnumber(x)): 'Value must be a number.']".to_string(),
                ];
                match (definition.field_type, definition.decimals) {
                    (FieldType::Integer, _) => {
                        arms.push("[decimals(x) > 0: 'Value must be a whole number.']".to_string())
                    }
                    (_, Some(places)) => arms.push(format!(
                        "[decimals(x) > {}: 'At most {} decimal places allowed.']",
                        places, places
                    )),
                    _ => {}
                }
                (arms, "true".to_string())
            }
            _ => (vec![required], "true".to_string()),
        };

        Ok(rule)
    }

    /// The last member of a checkbox group insists that something is checked
    fn checkbox_group_arm(
        &self,
        definition: &FieldDefinition,
        layout: &LayoutDirectives,
    ) -> Result<Option<String>, MetadataError> {
        if definition.field_type != FieldType::Checkbox || layout.checkbox_group.is_none() {
            return Ok(None);
        }

        let groups = self.resolver.binary_checkbox_groups(&definition.table)?;
        let Some((_, members)) = groups.get(&definition.field) else {
            return Ok(None);
        };

        let mut unchecked = vec!["x != 1".to_string(), "x != m".to_string()];
        unchecked.extend(
            members
                .iter()
                .filter(|m| **m != definition.field)
                .map(|m| format!("{} != 1", m)),
        );

        Ok(Some(format!(
            "[{}: 'At least one option must be selected.']",
            unchecked.join(" and ")
        )))
    }
}

fn finish(arms: Vec<String>, body: String, steps: Vec<PolicyStep>) -> DerivedRule {
    let text = if arms.is_empty() {
        body
    } else {
        format!("{} {}", arms.concat(), body)
    };
    DerivedRule { text, steps }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Set members: numbers stay bare, everything else is quoted
fn set_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| {
            if v.parse::<f64>().is_ok() {
                v.clone()
            } else {
                quote(v)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
