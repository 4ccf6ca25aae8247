//! Configuration types for the OpenSearch index sink.

use instance_indexer_shared::INDEX_NAME;

/// Configuration for the instance index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Name of the index (or alias) documents are written to.
    pub index_name: String,
    /// Primary shard count used when the index is created.
    pub number_of_shards: u32,
    /// Replica count used when the index is created.
    pub number_of_replicas: u32,
    /// Page size used when scanning document ids.
    pub scan_page_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_name: INDEX_NAME.to_string(),
            number_of_shards: 1,
            number_of_replicas: 1,
            scan_page_size: 1000,
        }
    }
}

impl IndexConfig {
    /// Create a config for a custom index name with default settings.
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            ..Default::default()
        }
    }
}
