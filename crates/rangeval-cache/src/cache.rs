//! Compiled-validator cache with single-flight compilation
//!
//! Validators are keyed by (table, field, digest). The digest covers the
//! rule text and the metadata it compiles against, so an edited rule or
//! dictionary simply misses and compiles fresh; the stale entry for the same
//! field is dropped when the new one is created.
//!
//! Each key owns a slot guarded by its own mutex. The first caller for a key
//! compiles while holding the slot; concurrent callers for the same key wait
//! on the slot and then share the result. Callers for other keys are never
//! blocked by a compile.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = ValidatorCache::new();
//! let validator = cache.get_or_compile(&compiler, "vitals", "pulse")?;
//! let verdict = validator.evaluate("72", &ctx).await;
//! ```

use rangeval_dsl::CompileError;
use rangeval_engine::{CompiledValidator, Compiler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    table: String,
    field: String,
    digest: String,
}

impl CacheKey {
    fn is_field(&self, table: &str, field: &str) -> bool {
        self.table == table && self.field == field
    }
}

type Slot = Arc<Mutex<Option<Arc<CompiledValidator>>>>;

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from a compiled entry
    pub hits: usize,

    /// Requests that had to compile
    pub misses: usize,

    /// Successful compilations
    pub compilations: usize,

    /// Compilations that failed (never cached)
    pub failures: usize,
}

#[derive(Default)]
pub struct ValidatorCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    compilations: AtomicUsize,
    failures: AtomicUsize,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached validator for `table.field`, compiling it if needed
    ///
    /// Compile errors are returned to every waiting caller in turn and are
    /// never cached; the next request tries again.
    pub fn get_or_compile(
        &self,
        compiler: &Compiler,
        table: &str,
        field: &str,
    ) -> Result<Arc<CompiledValidator>, CompileError> {
        let key = CacheKey {
            table: table.to_string(),
            field: field.to_string(),
            digest: compiler.digest(table, field)?,
        };

        let slot = self.slot(&key);
        let Ok(mut entry) = slot.lock() else {
            // A compile panicked while holding the slot; serve uncached
            warn!(table, field, "Validator slot poisoned, compiling without cache");
            return self.compile(compiler, &key).map(Arc::new);
        };

        if let Some(validator) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(validator));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let validator = Arc::new(self.compile(compiler, &key)?);

        // Metadata changed between digest and compile; don't file it under the old key
        if validator.digest() != key.digest {
            debug!(table, field, "Digest moved during compilation, not caching");
            return Ok(validator);
        }

        *entry = Some(Arc::clone(&validator));
        Ok(validator)
    }

    /// Cached validator for an exact key, without compiling
    pub fn get(&self, table: &str, field: &str, digest: &str) -> Option<Arc<CompiledValidator>> {
        let key = CacheKey {
            table: table.to_string(),
            field: field.to_string(),
            digest: digest.to_string(),
        };

        let slot = match self.slots.read() {
            Ok(slots) => slots.get(&key).cloned(),
            Err(_) => None,
        }?;
        let entry = slot.lock().ok()?;
        entry.as_ref().map(Arc::clone)
    }

    /// Drop every entry for `table.field`; returns how many were dropped
    pub fn invalidate(&self, table: &str, field: &str) -> usize {
        if let Ok(mut slots) = self.slots.write() {
            let before = slots.len();
            slots.retain(|key, _| !key.is_field(table, field));
            before - slots.len()
        } else {
            0
        }
    }

    /// Drop every entry for a table
    pub fn invalidate_table(&self, table: &str) -> usize {
        if let Ok(mut slots) = self.slots.write() {
            let before = slots.len();
            slots.retain(|key, _| key.table != table);
            before - slots.len()
        } else {
            0
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.write() {
            slots.clear();
        }
    }

    /// Number of compiled validators held
    ///
    /// Waits for compilations in flight.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = match self.slots.read() {
            Ok(slots) => slots.values().cloned().collect(),
            Err(_) => return 0,
        };
        slots
            .iter()
            .filter(|slot| slot.lock().map(|entry| entry.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Slot for `key`, created if missing; older digests of the field are dropped
    fn slot(&self, key: &CacheKey) -> Slot {
        if let Ok(slots) = self.slots.read() {
            if let Some(slot) = slots.get(key) {
                return Arc::clone(slot);
            }
        }

        match self.slots.write() {
            Ok(mut slots) => {
                if let Some(slot) = slots.get(key) {
                    return Arc::clone(slot);
                }
                slots.retain(|other, _| !other.is_field(&key.table, &key.field));
                let slot = Slot::default();
                slots.insert(key.clone(), Arc::clone(&slot));
                slot
            }
            // Unshared slot: the caller still compiles, nothing is cached
            Err(_) => Slot::default(),
        }
    }

    fn compile(&self, compiler: &Compiler, key: &CacheKey) -> Result<CompiledValidator, CompileError> {
        debug!(table = %key.table, field = %key.field, digest = %key.digest, "Compiling validator");
        match compiler.compile_field(&key.table, &key.field) {
            Ok(validator) => {
                self.compilations.fetch_add(1, Ordering::Relaxed);
                Ok(validator)
            }
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(table = %key.table, field = %key.field, %error, "Compilation failed");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangeval_catalog::InMemoryStore;
    use rangeval_core::{CompilerConfig, FieldDefinition, FieldType};

    fn setup() -> (Arc<InMemoryStore>, Compiler) {
        let store = Arc::new(
            InMemoryStore::builder()
                .with_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 30 and 200"))
                .with_field(FieldDefinition::new("vitals", "temp", FieldType::Decimal).with_rangeval("x > 30"))
                .build(),
        );
        let compiler = Compiler::new(store.clone(), CompilerConfig::default());
        (store, compiler)
    }

    #[test]
    fn second_request_hits() {
        let (_, compiler) = setup();
        let cache = ValidatorCache::new();

        let first = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
        let second = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                compilations: 1,
                failures: 0
            }
        );
        assert_eq!(cache.len(), 1);
        assert!(cache.get("vitals", "pulse", first.digest()).is_some());
    }

    #[test]
    fn edited_rule_replaces_entry() {
        let (store, compiler) = setup();
        let cache = ValidatorCache::new();

        let old = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
        store
            .upsert_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 40 and 180"))
            .unwrap();
        let new = cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();

        assert_ne!(old.digest(), new.digest());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("vitals", "pulse", old.digest()).is_none());
        assert_eq!(cache.stats().compilations, 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let (store, compiler) = setup();
        let cache = ValidatorCache::new();

        store
            .upsert_field(FieldDefinition::new("vitals", "temp", FieldType::Decimal).with_rangeval("(x > 30"))
            .unwrap();

        assert!(cache.get_or_compile(&compiler, "vitals", "temp").is_err());
        assert!(cache.get_or_compile(&compiler, "vitals", "temp").is_err());
        assert_eq!(cache.stats().failures, 2);
        assert_eq!(cache.stats().compilations, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidation() {
        let (_, compiler) = setup();
        let cache = ValidatorCache::new();

        cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
        cache.get_or_compile(&compiler, "vitals", "temp").unwrap();
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate("vitals", "pulse"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_table("vitals"), 1);
        assert!(cache.is_empty());

        cache.get_or_compile(&compiler, "vitals", "pulse").unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let (_, compiler) = setup();
        let cache = ValidatorCache::new();

        let error = cache.get_or_compile(&compiler, "vitals", "weight").unwrap_err();
        assert!(!error.is_syntax());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
