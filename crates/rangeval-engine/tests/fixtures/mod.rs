//! Test fixtures for validator evaluation tests
//!
//! A follow-up form with authored and derived rules, a checkbox group with
//! an indented subquestion, and a visit date checked against the previous
//! visit through a cross-table lookup.
//!
//! A screening form and an adverse event log whose rules are all derived
//! from metadata. Neither declares its visit or row-id column as a field.

use rangeval_catalog::{row, DataDictionary, InMemoryStore, MockRecordSource};
use rangeval_core::{CompilerConfig, FieldDefinition, FieldType, TableInfo};
use rangeval_engine::Compiler;
use std::sync::Arc;

pub fn followup_store() -> InMemoryStore {
    InMemoryStore::builder()
        .with_table(TableInfo::new("followup").with_index_columns(&["subjid", "visitno"]))
        .with_field(FieldDefinition::new("followup", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("followup", "visitno", FieldType::Integer).with_admin(true))
        .with_field(FieldDefinition::new("followup", "score", FieldType::Integer).with_rangeval("between 1 and 25"))
        .with_field(
            FieldDefinition::new("followup", "scorena", FieldType::Integer)
                .with_rangeval("between 1 and 25 or x=m or x=n"),
        )
        .with_field(FieldDefinition::new("followup", "grade", FieldType::Text).with_rangeval("in(0,1,n,abc,a..c,1..2)"))
        .with_field(FieldDefinition::new("followup", "consent", FieldType::Radio).with_codes("1=Yes;0=No"))
        .with_field(FieldDefinition::new("followup", "comment", FieldType::Text).with_rangeval("[x=n:'Error: blank']"))
        .with_field(
            FieldDefinition::new("followup", "remark", FieldType::Text)
                .with_rangeval("if x=n then 'Error: blank' else true endif"),
        )
        .with_field(FieldDefinition::new("followup", "headache", FieldType::Checkbox).with_layout("checkbox=sx"))
        .with_field(FieldDefinition::new("followup", "nausea", FieldType::Checkbox).with_layout("checkbox=sx"))
        .with_field(FieldDefinition::new("followup", "sxother", FieldType::Text).with_indent(1))
        .with_field(
            FieldDefinition::new("followup", "vdate", FieldType::Date).with_rangeval(
                "PREV = visits{visitno = visitno - 1}; \
                 if PREV then x >= PREV.vdate else true endif",
            ),
        )
        .with_table(TableInfo::new("visits").with_index_columns(&["subjid", "visitno"]))
        .with_field(FieldDefinition::new("visits", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("visits", "visitno", FieldType::Integer).with_admin(true))
        .with_field(FieldDefinition::new("visits", "vdate", FieldType::Date))
        .build()
}

pub fn compiler() -> Compiler {
    Compiler::new(Arc::new(followup_store()), CompilerConfig::default())
}

pub fn screening_store() -> InMemoryStore {
    InMemoryStore::builder()
        .with_table(
            TableInfo::new("screening")
                .with_index_columns(&["subjid", "visitno"])
                .with_visit_column("visitno"),
        )
        .with_field(FieldDefinition::new("screening", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("screening", "done", FieldType::Radio).with_codes("1=Yes;0=No"))
        .with_field(FieldDefinition::new("screening", "reason", FieldType::Text).with_layout("missingtrigger=done:0"))
        .with_field(
            FieldDefinition::new("screening", "height", FieldType::Integer)
                .with_codes("100..250")
                .with_visibility("visits:1"),
        )
        .with_field(FieldDefinition::new("screening", "packs", FieldType::Integer).with_visibility("done == 1"))
        .with_field(FieldDefinition::new("screening", "waist", FieldType::Decimal).with_visibility("hidden"))
        .with_field(
            FieldDefinition::new("screening", "bmi", FieldType::Decimal)
                .with_layout("calc=insert:bmi")
                .with_visibility("hidden"),
        )
        .with_field(FieldDefinition::new("screening", "pin", FieldType::Password).with_layout("password"))
        .with_field(FieldDefinition::new("screening", "bedtime", FieldType::Text).with_layout("militarytime"))
        .with_field(FieldDefinition::new("screening", "vdate", FieldType::Date).with_layout("letpass=2024-06-30"))
        .with_field(FieldDefinition::new("screening", "level", FieldType::Integer).with_codes("-5..5"))
        .with_field(FieldDefinition::new("screening", "cough", FieldType::Checkbox).with_layout("checkbox=sx"))
        .with_field(FieldDefinition::new("screening", "fever", FieldType::Checkbox).with_layout("checkbox=sx"))
        .build()
}

/// Adverse event log keyed by `aeid`; negative ids mark rows pending deletion
pub const AE_DICTIONARY: &str = r#"{
  "tables": [
    {
      "name": "ae",
      "index_columns": ["subjid"],
      "log_form": true,
      "row_id_column": "aeid",
      "fields": [
        { "field": "subjid", "type": "text", "admin": true },
        { "field": "aesev", "type": "radio", "codes": "1=Mild;2=Severe" }
      ]
    }
  ]
}"#;

pub fn derived_compiler() -> Compiler {
    Compiler::new(Arc::new(screening_store()), CompilerConfig::default())
}

pub fn ae_compiler() -> Compiler {
    let dictionary = DataDictionary::from_json(AE_DICTIONARY).unwrap();
    let store = InMemoryStore::from_dictionary(dictionary).unwrap();
    Compiler::new(Arc::new(store), CompilerConfig::default())
}

/// Visit 1 of subject 101 on 2024-01-10
pub async fn visit_source() -> MockRecordSource {
    let source = MockRecordSource::new();
    source
        .add_row(
            "visits",
            row(&[("subjid", "101"), ("visitno", "1"), ("vdate", "2024-01-10")]),
        )
        .await;
    source
}
