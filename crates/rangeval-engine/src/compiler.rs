//! Per-field compilation pipeline
//!
//! Resolve the field, derive a rule from metadata when none was written,
//! parse it against a fresh [`CompilationContext`], then generate the
//! program. The digest identifies the rule text together with everything in
//! the field's table that compilation reads, so a cached validator can be
//! matched against the current metadata.

use crate::codegen;
use crate::validator::CompiledValidator;
use rangeval_catalog::MetadataStore;
use rangeval_core::{CompilerConfig, FieldDefinition};
use rangeval_dsl::{
    normalize, parse, CompilationContext, CompileError, DefaultPolicy, MetadataError, PolicyStep,
    Resolver,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// The rule text a validator was compiled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    pub text: String,

    /// Policy steps that produced the text; `None` when an author wrote it
    pub derived: Option<Vec<PolicyStep>>,
}

impl RuleSource {
    pub fn authored(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            derived: None,
        }
    }

    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }
}

/// Everything `rangeval explain` prints about one field
#[derive(Debug, Clone)]
pub struct Explanation {
    pub source: RuleSource,
    pub normalized: String,
    pub tree: String,
    pub program: String,
    pub digest: String,
}

pub struct Compiler {
    store: Arc<dyn MetadataStore>,
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(store: Arc<dyn MetadataStore>, config: CompilerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the rule stored for `table.field`
    pub fn compile_field(&self, table: &str, field: &str) -> Result<CompiledValidator, CompileError> {
        let resolver = Resolver::new(self.store.as_ref());
        let definition = resolver.resolve(table, field)?;
        let source = self.source_for(&resolver, &definition)?;
        let digest = self.digest_for(&resolver, &definition, &definition.rangeval)?;
        self.build(&resolver, definition, source, digest)
    }

    /// Compile `text` as if it were the rule of `table.field`
    ///
    /// Empty text derives the default rule, as for a stored empty rule.
    pub fn compile_rule(
        &self,
        table: &str,
        field: &str,
        text: &str,
    ) -> Result<CompiledValidator, CompileError> {
        let resolver = Resolver::new(self.store.as_ref());
        let mut definition = resolver.resolve(table, field)?;
        definition.rangeval = text.to_string();
        let source = self.source_for(&resolver, &definition)?;
        let digest = self.digest_for(&resolver, &definition, text)?;
        self.build(&resolver, definition, source, digest)
    }

    /// Rule text `table.field` compiles from
    pub fn rule_source(&self, table: &str, field: &str) -> Result<RuleSource, CompileError> {
        let resolver = Resolver::new(self.store.as_ref());
        let definition = resolver.resolve(table, field)?;
        self.source_for(&resolver, &definition)
    }

    /// Digest of the stored rule and the metadata it compiles against
    ///
    /// Cheap compared with a compile; caches use it to decide whether a
    /// validator is still current.
    pub fn digest(&self, table: &str, field: &str) -> Result<String, CompileError> {
        let resolver = Resolver::new(self.store.as_ref());
        let definition = resolver.resolve(table, field)?;
        self.digest_for(&resolver, &definition, &definition.rangeval)
    }

    pub fn explain(&self, table: &str, field: &str) -> Result<Explanation, CompileError> {
        let validator = self.compile_field(table, field)?;
        let normalized = normalize(&validator.source().text)?;

        Ok(Explanation {
            source: validator.source().clone(),
            normalized,
            tree: validator.rule().to_string(),
            program: validator.program().to_string(),
            digest: validator.digest().to_string(),
        })
    }

    fn source_for(
        &self,
        resolver: &Resolver<'_>,
        definition: &FieldDefinition,
    ) -> Result<RuleSource, CompileError> {
        if !definition.has_empty_rule() {
            return Ok(RuleSource::authored(definition.rangeval.clone()));
        }

        let derived = DefaultPolicy::new(resolver, &self.config).derive(definition)?;
        debug!(
            table = %definition.table,
            field = %definition.field,
            steps = ?derived.steps,
            rule = %derived.text,
            "Derived default rule"
        );

        Ok(RuleSource {
            text: derived.text,
            derived: Some(derived.steps),
        })
    }

    fn digest_for(
        &self,
        resolver: &Resolver<'_>,
        definition: &FieldDefinition,
        text: &str,
    ) -> Result<String, CompileError> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(to_json(definition)?);
        hasher.update(to_json(&resolver.table_info(&definition.table)?)?);
        hasher.update(to_json(&resolver.table_fields(&definition.table)?)?);
        hasher.update(to_json(&self.config)?);
        Ok(hex::encode(hasher.finalize()))
    }

    fn build(
        &self,
        resolver: &Resolver<'_>,
        definition: FieldDefinition,
        source: RuleSource,
        digest: String,
    ) -> Result<CompiledValidator, CompileError> {
        let table = definition.table.clone();
        let field = definition.field.clone();

        let rule = {
            let mut ctx = CompilationContext::new(resolver, definition);
            parse(&source.text, &mut ctx)?
        };
        debug!(
            table = %table,
            field = %field,
            statements = rule.statements.len(),
            locals = rule.locals.len(),
            lookups = rule.lookups,
            "Parsed rule"
        );

        let program = codegen::generate(&rule, &self.config);
        debug!(table = %table, field = %field, instructions = program.len(), "Generated program");

        Ok(CompiledValidator::new(table, field, source, digest, rule, program))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CompileError> {
    serde_json::to_vec(value).map_err(|e| MetadataError::Store(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangeval_catalog::InMemoryStore;
    use rangeval_core::{FieldType, TableInfo};

    fn compiler() -> (Arc<InMemoryStore>, Compiler) {
        let store = Arc::new(
            InMemoryStore::builder()
                .with_table(TableInfo::new("vitals").with_index_columns(&["subjid"]))
                .with_field(FieldDefinition::new("vitals", "subjid", FieldType::Text).with_admin(true))
                .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_codes("30..200"))
                .with_field(
                    FieldDefinition::new("vitals", "temp", FieldType::Decimal)
                        .with_decimals(1)
                        .with_rangeval("x between 35 and 42"),
                )
                .build(),
        );
        let compiler = Compiler::new(store.clone(), CompilerConfig::default());
        (store, compiler)
    }

    #[test]
    fn authored_and_derived_sources() {
        let (_, compiler) = compiler();

        let source = compiler.rule_source("vitals", "temp").unwrap();
        assert_eq!(source, RuleSource::authored("x between 35 and 42"));

        let source = compiler.rule_source("vitals", "pulse").unwrap();
        assert!(source.is_derived());
        assert!(source.text.contains("in (c, m)"));
    }

    #[test]
    fn digest_is_stable_and_tracks_metadata() {
        let (store, compiler) = compiler();

        let first = compiler.digest("vitals", "temp").unwrap();
        assert_eq!(first, compiler.digest("vitals", "temp").unwrap());
        assert_eq!(first.len(), 64);
        assert_eq!(compiler.compile_field("vitals", "temp").unwrap().digest(), first);

        store
            .upsert_field(
                FieldDefinition::new("vitals", "temp", FieldType::Decimal)
                    .with_decimals(1)
                    .with_rangeval("x between 35 and 41"),
            )
            .unwrap();
        assert_ne!(first, compiler.digest("vitals", "temp").unwrap());
    }

    #[test]
    fn compile_rule_overrides_stored_text() {
        let (_, compiler) = compiler();

        let validator = compiler.compile_rule("vitals", "temp", "x > 30").unwrap();
        assert_eq!(validator.source().text, "x > 30");
        assert_ne!(validator.digest(), compiler.digest("vitals", "temp").unwrap());

        let derived = compiler.compile_rule("vitals", "temp", "  ").unwrap();
        assert!(derived.source().is_derived());
    }

    #[test]
    fn errors_stop_compilation() {
        let (_, compiler) = compiler();

        let error = compiler.compile_rule("vitals", "temp", "[x = n: true").unwrap_err();
        assert!(error.is_syntax());

        let error = compiler.compile_field("vitals", "weight").unwrap_err();
        assert!(matches!(error, CompileError::Metadata(MetadataError::NotFound { .. })));

        let error = compiler.compile_field("labs", "alt").unwrap_err();
        assert!(matches!(error, CompileError::Metadata(MetadataError::TableNotFound(_))));
    }

    #[test]
    fn explain_reports_every_stage() {
        let (_, compiler) = compiler();

        let explanation = compiler.explain("vitals", "temp").unwrap();
        assert_eq!(explanation.normalized, "x between 35 and 42");
        assert!(explanation.tree.contains("between"));
        assert!(explanation.program.contains("check"));
    }
}
