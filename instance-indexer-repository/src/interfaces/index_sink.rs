//! Index sink trait definition.
//!
//! This module defines the abstract interface for the search index holding
//! instance documents, allowing for different backend implementations
//! (OpenSearch, in-memory mocks for tests, etc.).

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::BulkSummary;
use instance_indexer_shared::{FilterExpr, InstanceDocument};

/// Abstract interface for index operations.
///
/// Writes are keyed by document id and always replace the whole document;
/// there is no partial patch.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Create or fully replace the document stored under `document.id`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written
    /// * `Err(SearchError)` - If the write fails
    async fn upsert(&self, document: &InstanceDocument) -> Result<(), SearchError>;

    /// Upsert many documents in a single request.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - Per-document outcome; individual items may have failed
    /// * `Err(SearchError::BulkIndexError)` - If the request failed as a whole
    async fn bulk_upsert(&self, documents: &[InstanceDocument])
        -> Result<BulkSummary, SearchError>;

    /// Delete the document stored under `id`.
    ///
    /// A missing document is not an error.
    async fn delete(&self, id: &str) -> Result<(), SearchError>;

    /// Return documents matching `filter`, optionally narrowed by free text.
    ///
    /// # Arguments
    ///
    /// * `filter` - Mandatory filter, normally the caller's access filter
    /// * `text` - Optional full-text query over analyzed fields
    /// * `size` - Maximum number of documents to return
    async fn query(
        &self,
        filter: &FilterExpr,
        text: Option<&str>,
        size: usize,
    ) -> Result<Vec<InstanceDocument>, SearchError>;

    /// Return the ids of every document matching `filter`, in id order.
    ///
    /// Used by the catch-up job to find documents for instances that no
    /// longer exist.
    async fn scan_ids(&self, filter: &FilterExpr) -> Result<Vec<String>, SearchError>;

    /// Ensure the index exists with the instance mapping.
    ///
    /// This should be called during application startup.
    async fn ensure_index_exists(&self) -> Result<(), SearchError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the search engine is healthy
    /// * `Ok(false)` - If the search engine is unhealthy
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
