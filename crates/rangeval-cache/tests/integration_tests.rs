//! Integration tests for the validator cache

mod fixtures;

use fixtures::{compiler, vitals_store};
use pretty_assertions::assert_eq;
use rangeval_cache::{CacheStats, ValidatorCache};
use rangeval_core::{FieldDefinition, FieldType};
use rangeval_engine::ValidationContext;
use std::sync::Arc;

#[test]
fn concurrent_requests_compile_once() {
    let compiler = compiler(vitals_store());
    let cache = ValidatorCache::new();

    let validators: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| cache.get_or_compile(&compiler, "vitals", "pulse").unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(validators.iter().all(|v| Arc::ptr_eq(v, &validators[0])));
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 15,
            misses: 1,
            compilations: 1,
            failures: 0
        }
    );
}

#[test]
fn distinct_fields_get_distinct_entries() {
    let compiler = compiler(vitals_store());
    let cache = ValidatorCache::new();

    std::thread::scope(|scope| {
        for field in ["pulse", "sbp", "position"] {
            let (cache, compiler) = (&cache, &compiler);
            scope.spawn(move || {
                for _ in 0..4 {
                    cache.get_or_compile(compiler, "vitals", field).unwrap();
                }
            });
        }
    });

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().compilations, 3);
    assert_eq!(cache.stats().hits, 9);
}

#[test]
fn broken_rule_is_retried_after_fix() {
    let store = vitals_store();
    let compiler = compiler(Arc::clone(&store));
    let cache = ValidatorCache::new();

    store
        .upsert_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 30 and"))
        .unwrap();
    assert!(cache.get_or_compile(&compiler, "vitals", "pulse").unwrap_err().is_syntax());
    assert!(cache.is_empty());

    store
        .upsert_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 30 and 220"))
        .unwrap();
    let validator = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
    assert_eq!(validator.source().text, "between 30 and 220");
    assert_eq!(cache.stats().failures, 1);
    assert_eq!(cache.stats().compilations, 1);
}

#[tokio::test]
async fn edited_rule_takes_effect() {
    let store = vitals_store();
    let compiler = compiler(Arc::clone(&store));
    let cache = ValidatorCache::new();
    let ctx = ValidationContext::new();

    let before = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
    assert!(!before.evaluate("210", &ctx).await.accepted);

    store
        .upsert_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 30 and 220"))
        .unwrap();
    let after = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();

    assert!(after.evaluate("210", &ctx).await.accepted);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn invalidate_forces_recompile() {
    let compiler = compiler(vitals_store());
    let cache = ValidatorCache::new();

    let first = cache.get_or_compile(&compiler, "vitals", "sbp").unwrap();
    assert_eq!(cache.invalidate("vitals", "sbp"), 1);
    assert_eq!(cache.invalidate("vitals", "sbp"), 0);

    let second = cache.get_or_compile(&compiler, "vitals", "sbp").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.digest(), second.digest());
    assert_eq!(cache.stats().compilations, 2);
}
