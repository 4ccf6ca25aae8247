//! OpenSearch implementation of the index sink.
//!
//! This module provides a concrete implementation of `IndexSink`
//! using OpenSearch as the backend.

mod client;
pub mod index_config;
pub mod queries;

pub use client::OpenSearchClient;
