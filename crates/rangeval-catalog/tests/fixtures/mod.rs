//! Test fixtures for metadata store and record source tests
//!
//! A small study: a vitals form with an enrollment key, a visits table used
//! by cross-table lookups, and an adverse-event log form.

use rangeval_catalog::{row, InMemoryStore, MockRecordSource};
use rangeval_core::{FieldDefinition, FieldType, TableInfo};

/// Vitals form collected at every visit
pub fn vitals_table() -> TableInfo {
    TableInfo::new("vitals")
        .with_index_columns(&["subjid", "visitno"])
        .with_visit_column("visitno")
}

/// Visit log with one row per subject visit
pub fn visits_table() -> TableInfo {
    TableInfo::new("visits")
        .with_index_columns(&["subjid", "visitno"])
        .with_visit_column("visitno")
}

/// Adverse events: a repeating log form
pub fn ae_table() -> TableInfo {
    TableInfo::new("ae")
        .with_index_columns(&["subjid"])
        .with_log_form("aeid")
}

pub fn study_store() -> InMemoryStore {
    InMemoryStore::builder()
        .with_table(vitals_table())
        .with_field(FieldDefinition::new("vitals", "subjid", FieldType::Text).with_admin(true))
        .with_field(FieldDefinition::new("vitals", "visitno", FieldType::Integer).with_admin(true))
        .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_codes("30..200"))
        .with_field(FieldDefinition::new("vitals", "temp", FieldType::Decimal).with_codes("35..42:0.1").with_decimals(1))
        .with_table(visits_table())
        .with_field(FieldDefinition::new("visits", "subjid", FieldType::Text))
        .with_field(FieldDefinition::new("visits", "visitno", FieldType::Integer))
        .with_field(FieldDefinition::new("visits", "vdate", FieldType::Date))
        .with_table(ae_table())
        .with_field(FieldDefinition::new("ae", "subjid", FieldType::Text))
        .with_field(FieldDefinition::new("ae", "aeid", FieldType::Integer))
        .with_field(FieldDefinition::new("ae", "aeterm", FieldType::Text))
        .build()
}

/// Two visits for subject 101
pub async fn visit_records() -> MockRecordSource {
    let source = MockRecordSource::new();
    source
        .add_row("visits", row(&[("subjid", "101"), ("visitno", "1"), ("vdate", "2024-01-10")]))
        .await;
    source
        .add_row("visits", row(&[("subjid", "101"), ("visitno", "2"), ("vdate", "2024-02-14")]))
        .await;
    source
}
