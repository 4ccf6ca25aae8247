//! Loader module for the instance indexer pipeline.
//!
//! Loads mapped instance documents into the search index in batches.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use instance_indexer_repository::{IndexSink, SearchError};
use instance_indexer_shared::InstanceDocument;

/// Configuration for the search loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of documents to batch before flushing.
    pub batch_size: usize,
    /// Maximum number of retry attempts for failed indexing operations.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5000,
        }
    }
}

/// Loader that writes documents through an [`IndexSink`].
///
/// Documents are buffered and written with `bulk_upsert` once a batch is
/// full. Retryable failures back off exponentially. Items a bulk request
/// rejects are retried one by one with `upsert`.
pub struct SearchLoader {
    sink: Arc<dyn IndexSink>,
    config: LoaderConfig,
    pending_docs: Vec<InstanceDocument>,
    indexed: usize,
}

impl SearchLoader {
    /// Create a new search loader with the given sink.
    pub fn new(sink: Arc<dyn IndexSink>) -> Self {
        Self::with_config(sink, LoaderConfig::default())
    }

    /// Create a new search loader with custom configuration.
    pub fn with_config(sink: Arc<dyn IndexSink>, config: LoaderConfig) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            sink,
            config: LoaderConfig {
                batch_size,
                ..config
            },
            pending_docs: Vec::with_capacity(batch_size),
            indexed: 0,
        }
    }

    /// Number of documents written successfully so far.
    pub fn indexed(&self) -> usize {
        self.indexed
    }

    /// Buffer documents, flushing every time a batch fills up.
    #[instrument(skip(self, docs), fields(doc_count = docs.len()))]
    pub async fn load(&mut self, docs: Vec<InstanceDocument>) -> Result<(), PipelineError> {
        for doc in docs {
            self.pending_docs.push(doc);
            if self.pending_docs.len() >= self.config.batch_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// Flush all pending documents to the search index.
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<(), PipelineError> {
        if self.pending_docs.is_empty() {
            return Ok(());
        }

        let docs: Vec<InstanceDocument> = self.pending_docs.drain(..).collect();
        let count = docs.len();

        debug!(count = count, "Flushing documents to search index");

        let bulk_result = self
            .with_retry("bulk_upsert", || self.sink.bulk_upsert(&docs))
            .await;

        let rejected: Vec<&InstanceDocument> = match bulk_result {
            Ok(summary) => {
                self.indexed += summary.succeeded;
                if summary.failed == 0 {
                    debug!(count = count, "Successfully indexed documents");
                    return Ok(());
                }
                warn!(
                    failed = summary.failed,
                    total = summary.total,
                    "Bulk request rejected some documents"
                );
                summary
                    .failures()
                    .filter_map(|item| docs.iter().find(|doc| doc.id == item.id))
                    .collect()
            }
            Err(e) => {
                error!(error = %e, count = count, "Failed to bulk index documents after retries");
                docs.iter().collect()
            }
        };

        warn!(count = rejected.len(), "Attempting individual document indexing with retries");
        let mut success_count = 0;
        let mut error_count = 0;

        for doc in rejected {
            match self.with_retry("upsert", || self.sink.upsert(doc)).await {
                Ok(()) => success_count += 1,
                Err(e) => {
                    error!(
                        instance_id = %doc.id,
                        error = %e,
                        "Failed to index individual document after retries"
                    );
                    error_count += 1;
                }
            }
        }
        self.indexed += success_count;

        info!(
            success = success_count,
            errors = error_count,
            "Individual indexing completed"
        );

        if error_count > 0 {
            Err(PipelineError::loader(format!(
                "Failed to index {} documents after retries",
                error_count
            )))
        } else {
            Ok(())
        }
    }

    /// Run `op` with exponential backoff while it fails with a retryable error.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, SearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation = operation, attempt = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Index write failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                }
                Err(e) => {
                    debug!(operation = operation, error = %e, "Giving up on index write");
                    return Err(e);
                }
            }
        }
    }
}
