//! # Instance Indexer Repository
//!
//! This crate provides the index sink interface and its OpenSearch
//! implementation. It includes definitions for errors, interfaces, and
//! the query and mapping builders for the instance index.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::IndexConfig;
pub use errors::SearchError;
pub use interfaces::IndexSink;
pub use opensearch::OpenSearchClient;
pub use types::{BulkItemResult, BulkSummary};
