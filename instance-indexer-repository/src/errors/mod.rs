//! Error types for the instance indexer repository.

mod search_error;

pub use search_error::SearchError;
