//! In-memory metadata store
//!
//! Holds a whole data dictionary in memory. It's what the CLI loads from a
//! JSON file and what tests build with [`InMemoryStore::builder`].
//!
//! ## JSON layout
//!
//! ```json
//! {
//!   "tables": [
//!     {
//!       "name": "vitals",
//!       "index_columns": ["subjid", "visitno"],
//!       "visit_column": "visitno",
//!       "fields": [
//!         { "field": "pulse", "type": "integer", "codes": "30..200" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::store::{MetadataStore, StoreError};
use rangeval_core::{FieldDefinition, TableInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// One table as written in a dictionary file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryTable {
    #[serde(flatten)]
    pub info: TableInfo,

    /// Fields in form order
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Data dictionary file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDictionary {
    pub tables: Vec<DictionaryTable>,
}

impl DataDictionary {
    /// Load a dictionary from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidDictionary(format!("{}: {}", path.display(), e)))?;

        Self::from_json(&contents)
    }

    /// Parse a dictionary from a JSON string
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::InvalidDictionary(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct TableEntry {
    info: TableInfo,
    fields: Vec<FieldDefinition>,
}

/// Metadata store backed by a hash map
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, TableEntry>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::new()
    }

    /// Create a store from a parsed dictionary
    ///
    /// Field definitions inherit their table name from the enclosing table.
    /// Duplicate fields within one table are rejected.
    pub fn from_dictionary(dictionary: DataDictionary) -> Result<Self, StoreError> {
        let mut builder = InMemoryStoreBuilder::new();

        for table in dictionary.tables {
            let name = table.info.name.clone();
            builder = builder.with_table(table.info);

            let mut seen = std::collections::HashSet::new();
            for mut field in table.fields {
                if !seen.insert(field.field.clone()) {
                    return Err(StoreError::InvalidDictionary(format!(
                        "Field '{}' declared twice on table '{}'",
                        field.field, name
                    )));
                }
                field.table = name.clone();
                builder = builder.with_field(field);
            }
        }

        Ok(builder.build())
    }

    /// Load a store from a dictionary JSON file
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        Self::from_dictionary(DataDictionary::from_file(path)?)
    }

    /// Names of all tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.tables.read() {
            Ok(tables) => tables.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Replace (or add) a field definition
    pub fn upsert_field(&self, definition: FieldDefinition) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let entry = tables
            .get_mut(&definition.table)
            .ok_or_else(|| StoreError::TableNotFound(definition.table.clone()))?;

        match entry.fields.iter_mut().find(|f| f.field == definition.field) {
            Some(existing) => *existing = definition,
            None => entry.fields.push(definition),
        }

        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, TableEntry>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("metadata lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, TableEntry>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("metadata lock poisoned".to_string()))
    }
}

impl MetadataStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "InMemory"
    }

    fn field_definition(&self, table: &str, field: &str) -> Result<FieldDefinition, StoreError> {
        let tables = self.read()?;
        let entry = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        entry
            .fields
            .iter()
            .find(|f| f.field == field)
            .cloned()
            .ok_or_else(|| StoreError::FieldNotFound {
                table: table.to_string(),
                field: field.to_string(),
            })
    }

    fn table_fields(&self, table: &str) -> Result<Vec<FieldDefinition>, StoreError> {
        let tables = self.read()?;
        tables
            .get(table)
            .map(|entry| entry.fields.clone())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn table_exists(&self, table: &str) -> bool {
        self.read().map(|t| t.contains_key(table)).unwrap_or(false)
    }

    fn table_info(&self, table: &str) -> Result<TableInfo, StoreError> {
        let tables = self.read()?;
        tables
            .get(table)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// Builder for an [`InMemoryStore`]
///
/// ```rust,ignore
/// let store = InMemoryStore::builder()
///     .with_table(TableInfo::new("vitals").with_index_columns(&["subjid", "visitno"]))
///     .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer))
///     .build();
/// ```
pub struct InMemoryStoreBuilder {
    tables: HashMap<String, TableEntry>,
}

impl InMemoryStoreBuilder {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Declare a table (replaces table info, keeps fields)
    pub fn with_table(mut self, info: TableInfo) -> Self {
        let name = info.name.clone();
        self.tables
            .entry(name)
            .and_modify(|entry| entry.info = info.clone())
            .or_insert(TableEntry {
                info,
                fields: Vec::new(),
            });
        self
    }

    /// Append a field; declares its table if needed
    pub fn with_field(mut self, definition: FieldDefinition) -> Self {
        let entry = self
            .tables
            .entry(definition.table.clone())
            .or_insert_with(|| TableEntry {
                info: TableInfo::new(definition.table.clone()),
                fields: Vec::new(),
            });
        entry.fields.push(definition);
        self
    }

    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            tables: Arc::new(RwLock::new(self.tables)),
        }
    }
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
