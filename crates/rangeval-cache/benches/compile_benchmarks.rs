//! Benchmarks for rule compilation and cached validator lookups

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rangeval_cache::ValidatorCache;
use rangeval_catalog::InMemoryStore;
use rangeval_core::{CompilerConfig, FieldDefinition, FieldType};
use rangeval_engine::{Compiler, ValidationContext};
use std::sync::Arc;

/// A form with N integer fields, each with a compound rule
fn generate_form(num_fields: usize) -> Compiler {
    let mut builder = InMemoryStore::builder();
    for i in 0..num_fields {
        let rule = format!("between {} and {} or x=m or x=n", i, i + 100);
        builder = builder.with_field(
            FieldDefinition::new("form", format!("field_{}", i), FieldType::Integer).with_rangeval(rule),
        );
    }
    builder = builder.with_field(FieldDefinition::new("form", "coded", FieldType::Radio).with_codes("1=Yes;0=No;9=Unknown"));
    Compiler::new(Arc::new(builder.build()), CompilerConfig::default())
}

/// Benchmark: compile every field of a form, no cache
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for num_fields in [10, 100].iter() {
        let compiler = generate_form(*num_fields);

        group.bench_with_input(BenchmarkId::from_parameter(num_fields), num_fields, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    black_box(compiler.compile_field("form", &format!("field_{}", i)).ok());
                }
            });
        });
    }

    group.bench_function("derived_default", |b| {
        let compiler = generate_form(1);
        b.iter(|| black_box(compiler.compile_field("form", "coded").ok()));
    });

    group.finish();
}

/// Benchmark: cold compile vs warm cache hit
fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let compiler = generate_form(10);

    group.bench_function("cold", |b| {
        b.iter(|| {
            let cache = ValidatorCache::new();
            black_box(cache.get_or_compile(&compiler, "form", "field_5").ok())
        });
    });

    let cache = ValidatorCache::new();
    let _ = cache.get_or_compile(&compiler, "form", "field_5"); // Prime cache

    group.bench_function("warm", |b| {
        b.iter(|| black_box(cache.get_or_compile(&compiler, "form", "field_5").ok()));
    });

    group.finish();
}

/// Benchmark: evaluate a compiled validator
fn bench_evaluate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let compiler = generate_form(1);
    let validator = compiler.compile_field("form", "field_0").unwrap();
    let ctx = ValidationContext::new();

    c.bench_function("evaluate", |b| {
        b.iter(|| {
            runtime.block_on(async {
                for value in ["5", "150", "-9", "-8"] {
                    black_box(validator.evaluate(value, &ctx).await);
                }
            })
        });
    });
}

criterion_group!(benches, bench_compile, bench_cache, bench_evaluate);
criterion_main!(benches);
