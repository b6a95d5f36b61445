//! Test fixtures for validator cache tests

use rangeval_catalog::InMemoryStore;
use rangeval_core::{CompilerConfig, FieldDefinition, FieldType, TableInfo};
use rangeval_engine::Compiler;
use std::sync::Arc;

/// A vitals form with a mix of authored and derived rules
pub fn vitals_store() -> Arc<InMemoryStore> {
    Arc::new(
        InMemoryStore::builder()
            .with_table(TableInfo::new("vitals").with_index_columns(&["subjid", "visitno"]))
            .with_field(FieldDefinition::new("vitals", "subjid", FieldType::Text).with_admin(true))
            .with_field(FieldDefinition::new("vitals", "visitno", FieldType::Integer).with_admin(true))
            .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 30 and 200"))
            .with_field(
                FieldDefinition::new("vitals", "sbp", FieldType::Integer)
                    .with_rangeval("between 60 and 250 or x=m"),
            )
            .with_field(FieldDefinition::new("vitals", "position", FieldType::Radio).with_codes("1=Sitting;2=Standing"))
            .build(),
    )
}

pub fn compiler(store: Arc<InMemoryStore>) -> Compiler {
    Compiler::new(store, CompilerConfig::default())
}
