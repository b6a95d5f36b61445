//! Per-rule compilation context

use crate::resolver::Resolver;
use rangeval_core::FieldDefinition;
use std::collections::HashMap;

/// What the parser knows about the rule being compiled
///
/// One context per compilation; it is never shared between threads.
pub struct CompilationContext<'a> {
    pub resolver: &'a Resolver<'a>,
    pub definition: FieldDefinition,
    locals: Vec<String>,
    /// Local variables currently bound to a looked-up row, with the row's table
    rows: HashMap<String, String>,
    lookups: usize,
}

impl<'a> CompilationContext<'a> {
    pub fn new(resolver: &'a Resolver<'a>, definition: FieldDefinition) -> Self {
        Self {
            resolver,
            definition,
            locals: Vec::new(),
            rows: HashMap::new(),
            lookups: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.definition.table
    }

    pub fn field(&self) -> &str {
        &self.definition.field
    }

    /// Whether `name` is a field (or structural column) of the table being validated
    pub fn is_field(&self, name: &str) -> bool {
        self.resolver.has_column(&self.definition.table, name)
    }

    /// Record a local variable; repeated declarations are ignored
    pub fn declare_local(&mut self, name: &str) {
        if !self.locals.iter().any(|l| l == name) {
            self.locals.push(name.to_string());
        }
    }

    /// Bind a local to a row of `table`
    pub fn bind_row(&mut self, name: &str, table: &str) {
        self.declare_local(name);
        self.rows.insert(name.to_string(), table.to_string());
    }

    /// Bind a local to a plain value, dropping any row binding
    pub fn bind_value(&mut self, name: &str) {
        self.declare_local(name);
        self.rows.remove(name);
    }

    pub fn row_table(&self, name: &str) -> Option<&str> {
        self.rows.get(name).map(String::as_str)
    }

    pub fn next_lookup_id(&mut self) -> usize {
        let id = self.lookups;
        self.lookups += 1;
        id
    }

    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangeval_catalog::InMemoryStore;
    use rangeval_core::{FieldType, TableInfo};

    #[test]
    fn bindings() {
        let store = InMemoryStore::builder()
            .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer))
            .build();
        let resolver = Resolver::new(&store);
        let definition = resolver.resolve("vitals", "pulse").unwrap();
        let mut ctx = CompilationContext::new(&resolver, definition);

        ctx.bind_row("PREV", "visits");
        ctx.declare_local("PREV");
        assert_eq!(ctx.row_table("PREV"), Some("visits"));
        assert_eq!(ctx.locals(), &["PREV".to_string()]);

        ctx.bind_value("PREV");
        assert_eq!(ctx.row_table("PREV"), None);

        assert_eq!(ctx.next_lookup_id(), 0);
        assert_eq!(ctx.next_lookup_id(), 1);
        assert_eq!(ctx.lookup_count(), 2);
        assert!(ctx.is_field("pulse"));
        assert!(!ctx.is_field("weight"));
    }

    #[test]
    fn structural_columns_count_as_fields() {
        let store = InMemoryStore::builder()
            .with_table(TableInfo::new("ae").with_index_columns(&["subjid"]).with_log_form("aeid"))
            .with_field(FieldDefinition::new("ae", "aeterm", FieldType::Text))
            .build();
        let resolver = Resolver::new(&store);
        let definition = resolver.resolve("ae", "aeterm").unwrap();
        let ctx = CompilationContext::new(&resolver, definition);

        assert!(ctx.is_field("aeid"));
        assert!(ctx.is_field("subjid"));
        assert!(!ctx.is_field("aeseq"));
    }
}
