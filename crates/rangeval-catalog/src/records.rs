//! Record source trait for cross-table lookups at validation time

use std::collections::BTreeMap;
use std::fmt;

/// One row of another table, column name to raw value
pub type Row = BTreeMap<String, String>;

/// Comparison used in a lookup filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Apply the comparison to two raw values, numerically when both parse
    pub fn matches(&self, left: &str, right: &str) -> bool {
        let ordering = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
            (Ok(l), Ok(r)) => l.partial_cmp(&r),
            _ => Some(left.cmp(right)),
        };

        let Some(ordering) = ordering else {
            return false;
        };

        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => !ordering.is_eq(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

/// `column op value`, with the value already evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

/// A single-table, conjunctive row query
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub limit: usize,
}

impl RowQuery {
    /// Whether a row satisfies every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| {
            row.get(&f.column)
                .map(|value| f.op.matches(value, &f.value))
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for RowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.table)?;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{} {} '{}'", filter.column, filter.op.as_str(), filter.value)?;
        }
        write!(f, "}} limit {}", self.limit)
    }
}

/// Errors that can occur when fetching rows
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Source of rows for cross-table lookups
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Get the source name (e.g., "Mock")
    fn name(&self) -> &'static str;

    /// Fetch the first row matching the query, if any
    async fn fetch_row(&self, query: &RowQuery) -> Result<Option<Row>, FetchError>;
}
