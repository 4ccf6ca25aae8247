//! Error types for the instance indexer pipeline.

use instance_indexer_repository::SearchError;
use thiserror::Error;

/// A source payload is malformed or missing a required field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A required field is absent (or null).
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field is present but cannot be interpreted.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl MappingError {
    /// Create a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create an invalid field error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The compute service API could not be reached or answered with an error.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("Compute API unreachable: {0}")]
    Unreachable(String),

    /// The API answered with a non-success status.
    #[error("Compute API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Failed to decode compute API response: {0}")]
    Decode(String),

    /// The configured endpoint or a paging link is not a valid URL.
    #[error("Invalid compute API URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

/// Failure while handling a single notification.
///
/// `Mapping` and `Transport` are expected, data- or environment-driven
/// failures. `Internal` marks a defect in this crate and is logged as such.
#[derive(Error, Debug)]
pub enum HandlingError {
    #[error("Mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Index sink failed: {0}")]
    Transport(SearchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SearchError> for HandlingError {
    fn from(err: SearchError) -> Self {
        match err {
            // A document we built ourselves failing to serialize is our bug.
            SearchError::SerializationError(msg) => Self::Internal(msg),
            other => Self::Transport(other),
        }
    }
}

/// Errors that can occur in the instance indexer pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the compute API.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error from the search engine.
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Error mapping a source payload.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Error from the loader component.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding a message.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl PipelineError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
