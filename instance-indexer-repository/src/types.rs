//! Result types for index sink operations.

use crate::errors::SearchError;

/// Result of a bulk operation for a single document.
#[derive(Debug, Clone)]
pub struct BulkItemResult {
    /// The document id.
    pub id: String,
    /// Error if the operation failed for this document.
    pub error: Option<SearchError>,
}

impl BulkItemResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: SearchError) -> Self {
        Self {
            id: id.into(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a bulk operation containing aggregate statistics and individual results.
///
/// A bulk request can partially succeed. Callers inspect `failed` and the
/// per-item `results` to decide what to retry or report.
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BulkItemResult>,
}

impl BulkSummary {
    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BulkItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Items that failed, in request order.
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}
