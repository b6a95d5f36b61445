//! Mock record source for testing
//!
//! Serves cross-table lookups from rows held in memory. Useful for:
//! - Unit testing validators that bind lookups
//! - Demos without a clinical database
//! - Simulating lookup timeouts and connection failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rangeval_catalog::{MockRecordSource, RecordSource};
//!
//! let source = MockRecordSource::new();
//! source.add_row("visits", row(&[("subjid", "101"), ("visitno", "1")])).await;
//!
//! // Simulate a slow database
//! let slow = MockRecordSource::new().with_latency(500);
//! ```

use crate::records::{FetchError, RecordSource, Row, RowQuery};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Mock record source for testing
///
/// Rows are stored per table in insertion order; a query returns the first
/// row matching every filter. Clones share rows and the query counter.
pub struct MockRecordSource {
    /// Rows by table name
    rows: Arc<RwLock<HashMap<String, Vec<Row>>>>,

    /// Errors to return for specific tables
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Simulate connection failure on every query
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    /// Number of queries served (including failed ones)
    queries: Arc<AtomicUsize>,
}

impl MockRecordSource {
    /// Create a new mock source with no rows
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            fail_connection: false,
            latency_ms: 0,
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append a row to a table
    pub async fn add_row(&self, table: &str, row: Row) {
        self.rows
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Configure an error to be returned for a specific table
    pub async fn add_error_for_table(&self, table: &str, error: FetchError) {
        self.errors.write().await.insert(table.to_string(), error);
    }

    /// Configure every query to fail as if the database were unreachable
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for every query
    ///
    /// Useful for exercising lookup timeouts.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of rows stored for a table
    pub async fn row_count(&self, table: &str) -> usize {
        self.rows.read().await.get(table).map(|r| r.len()).unwrap_or(0)
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockRecordSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockRecordSource {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            errors: Arc::clone(&self.errors),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            queries: Arc::clone(&self.queries),
        }
    }
}

#[async_trait::async_trait]
impl RecordSource for MockRecordSource {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn fetch_row(&self, query: &RowQuery) -> Result<Option<Row>, FetchError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_connection {
            return Err(FetchError::NetworkError(
                "Simulated connection failure".to_string(),
            ));
        }

        // Check for configured errors first
        if let Some(error) = self.errors.read().await.get(&query.table) {
            return Err(error.clone());
        }

        let rows = self.rows.read().await;
        let Some(table_rows) = rows.get(&query.table) else {
            return Err(FetchError::TableNotFound(query.table.clone()));
        };

        // Only the first match matters; lookups always limit to one row
        Ok(table_rows.iter().find(|row| query.matches(row)).cloned())
    }
}

/// Build a row from column/value pairs
pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Filter, FilterOp};

    fn visit_query(visitno: &str) -> RowQuery {
        RowQuery {
            table: "visits".to_string(),
            filters: vec![
                Filter { column: "subjid".into(), op: FilterOp::Eq, value: "101".into() },
                Filter { column: "visitno".into(), op: FilterOp::Eq, value: visitno.into() },
            ],
            limit: 1,
        }
    }

    #[tokio::test]
    async fn returns_first_matching_row() {
        let source = MockRecordSource::new();
        source.add_row("visits", row(&[("subjid", "101"), ("visitno", "1"), ("vdate", "2024-01-05")])).await;
        source.add_row("visits", row(&[("subjid", "101"), ("visitno", "2"), ("vdate", "2024-02-05")])).await;

        let found = source.fetch_row(&visit_query("2")).await.unwrap().unwrap();
        assert_eq!(found.get("vdate").map(String::as_str), Some("2024-02-05"));

        assert!(source.fetch_row(&visit_query("3")).await.unwrap().is_none());
        assert_eq!(source.query_count(), 2);
        assert_eq!(source.row_count("visits").await, 2);
    }

    #[tokio::test]
    async fn unknown_table_is_an_error() {
        let source = MockRecordSource::new();
        let result = source.fetch_row(&visit_query("1")).await;
        assert_eq!(result, Err(FetchError::TableNotFound("visits".into())));
    }

    #[tokio::test]
    async fn simulated_failures() {
        let source = MockRecordSource::new().with_connection_failure();
        assert!(matches!(
            source.fetch_row(&visit_query("1")).await,
            Err(FetchError::NetworkError(_))
        ));

        let source = MockRecordSource::new();
        source
            .add_error_for_table("visits", FetchError::PermissionDenied("restricted".into()))
            .await;
        assert_eq!(
            source.fetch_row(&visit_query("1")).await,
            Err(FetchError::PermissionDenied("restricted".into()))
        );
    }

    #[tokio::test]
    async fn clones_share_rows() {
        let source = MockRecordSource::new();
        let clone = source.clone();
        clone.add_row("visits", row(&[("subjid", "101"), ("visitno", "1")])).await;

        assert_eq!(source.row_count("visits").await, 1);
    }
}
