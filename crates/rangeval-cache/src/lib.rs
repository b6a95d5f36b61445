//! Validator caching for rangeval
//!
//! Compiling a rule means resolving metadata, deriving a default rule where
//! none is authored, parsing, and generating code. Forms evaluate the same
//! fields over and over, so compiled validators are kept here keyed by their
//! compile digest.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rangeval_cache::ValidatorCache;
//!
//! let cache = ValidatorCache::new();
//! let validator = cache.get_or_compile(&compiler, "vitals", "pulse")?;
//! ```

pub mod cache;

pub use cache::{CacheStats, ValidatorCache};
