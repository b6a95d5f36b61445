//! Test fixtures for rule parsing tests
//!
//! A screening form exercising every kind of default rule: coded and ranged
//! fields, visit-restricted and conditional visibility, triggers, checkbox
//! groups with an indented subquestion, and a log form.

use rangeval_catalog::InMemoryStore;
use rangeval_core::{FieldDefinition, FieldType, TableInfo};

pub fn screening_store() -> InMemoryStore {
    InMemoryStore::builder()
        .with_table(
            TableInfo::new("screen")
                .with_index_columns(&["subjid", "visitno"])
                .with_visit_column("visitno"),
        )
        .with_field(FieldDefinition::new("screen", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("screen", "visitno", FieldType::Integer).with_admin(true))
        .with_field(FieldDefinition::new("screen", "consent", FieldType::Radio).with_codes("1=Yes;0=No"))
        .with_field(FieldDefinition::new("screen", "reason", FieldType::Text).with_layout("missingtrigger=consent:0"))
        .with_field(FieldDefinition::new("screen", "weight", FieldType::Decimal).with_codes("30..250:0.1").with_decimals(1))
        .with_field(FieldDefinition::new("screen", "height", FieldType::Integer).with_visibility("visits:1"))
        .with_field(FieldDefinition::new("screen", "smoker", FieldType::Radio).with_codes("1=Yes;0=No;2=Former"))
        .with_field(FieldDefinition::new("screen", "packs", FieldType::Integer).with_indent(1))
        .with_field(FieldDefinition::new("screen", "quitdate", FieldType::Date).with_layout("trigger=smoker:2"))
        .with_field(FieldDefinition::new("screen", "pregnant", FieldType::Radio).with_codes("1=Yes;0=No").with_visibility("sex = 2"))
        .with_field(FieldDefinition::new("screen", "sex", FieldType::Radio).with_codes("1=Male;2=Female"))
        .with_field(FieldDefinition::new("screen", "headache", FieldType::Checkbox).with_layout("checkbox=sx"))
        .with_field(FieldDefinition::new("screen", "nausea", FieldType::Checkbox).with_layout("checkbox=sx"))
        .with_field(FieldDefinition::new("screen", "sxother", FieldType::Text).with_indent(1))
        .with_field(FieldDefinition::new("screen", "bedtime", FieldType::Text).with_layout("militarytime"))
        .with_field(FieldDefinition::new("screen", "portal", FieldType::Password).with_layout("password"))
        .with_field(FieldDefinition::new("screen", "ecg", FieldType::File))
        .with_field(FieldDefinition::new("screen", "bmi", FieldType::Decimal).with_layout("calc=insert:bmi").with_visibility("hidden"))
        .with_field(FieldDefinition::new("screen", "vtime", FieldType::Time))
        .with_table(TableInfo::new("cm").with_index_columns(&["subjid"]).with_log_form("cmid"))
        .with_field(FieldDefinition::new("cm", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("cm", "cmid", FieldType::Integer).with_admin(true))
        .with_field(FieldDefinition::new("cm", "drug", FieldType::Text).with_layout("strict"))
        .with_field(FieldDefinition::new("cm", "dose", FieldType::Decimal))
        .build()
}
