//! Metadata store trait for reading the data dictionary

use rangeval_core::{FieldDefinition, TableInfo};

/// Errors that can occur when reading metadata
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Field not found: {table}.{field}")]
    FieldNotFound { table: String, field: String },

    #[error("Invalid data dictionary: {0}")]
    InvalidDictionary(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to field metadata
///
/// Compilation is synchronous, so the store is too. Implementations must
/// support concurrent readers; nothing in the compiler ever writes through
/// this trait.
pub trait MetadataStore: Send + Sync {
    /// Get the store name (e.g., "InMemory")
    fn name(&self) -> &'static str;

    /// Fetch the definition of one field
    fn field_definition(&self, table: &str, field: &str) -> Result<FieldDefinition, StoreError>;

    /// All fields of a table in form order
    fn table_fields(&self, table: &str) -> Result<Vec<FieldDefinition>, StoreError>;

    /// Whether the table is declared
    fn table_exists(&self, table: &str) -> bool;

    /// Table-level metadata
    fn table_info(&self, table: &str) -> Result<TableInfo, StoreError>;

    /// Columns that identify one record of the table
    fn table_index_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.table_info(table)?.index_columns)
    }

    /// Whether the field is declared on the table
    fn field_exists(&self, table: &str, field: &str) -> bool {
        self.field_definition(table, field).is_ok()
    }
}
