//! Metadata and record access for rule compilation
//!
//! Two seams live here:
//! - [`MetadataStore`]: synchronous, read-only access to the data dictionary
//!   (field definitions, table info). Used at compile time.
//! - [`RecordSource`]: asynchronous row fetches for cross-table lookups.
//!   Used at validation time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rangeval_catalog::{InMemoryStore, MetadataStore};
//!
//! let store = InMemoryStore::from_file(Path::new("dictionary.json"))?;
//! let def = store.field_definition("vitals", "pulse")?;
//! ```

pub mod store;
pub mod records;
pub mod memory;
pub mod mock;

pub use store::{MetadataStore, StoreError};
pub use records::{RecordSource, RowQuery, Row, Filter, FilterOp, FetchError};
pub use memory::{InMemoryStore, InMemoryStoreBuilder, DataDictionary, DictionaryTable};
pub use mock::{MockRecordSource, row};
