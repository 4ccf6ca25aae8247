//! Message types for the consumer.
//!
//! Compute notifications arrive as oslo-messaging JSON, either raw or wrapped
//! in the 2.0 envelope where the real message is a JSON string under
//! `oslo.message`.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::PipelineError;

const ENVELOPE_VERSION_KEY: &str = "oslo.version";
const ENVELOPE_MESSAGE_KEY: &str = "oslo.message";

/// A notification emitted by the compute service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    /// Dotted event name, e.g. `compute.instance.update`.
    pub event_type: String,
    /// Event body; shape depends on `event_type`.
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub publisher_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl Notification {
    /// Decode a notification from raw message bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::parse(format!("Invalid notification JSON: {}", e)))?;

        let value = match value.get(ENVELOPE_MESSAGE_KEY) {
            Some(Value::String(inner)) => serde_json::from_str(inner).map_err(|e| {
                PipelineError::parse(format!(
                    "Invalid {} payload (envelope {}): {}",
                    ENVELOPE_MESSAGE_KEY,
                    value
                        .get(ENVELOPE_VERSION_KEY)
                        .and_then(Value::as_str)
                        .unwrap_or("unknown"),
                    e
                ))
            })?,
            Some(_) => {
                return Err(PipelineError::parse(format!(
                    "{} must be a JSON string",
                    ENVELOPE_MESSAGE_KEY
                )))
            }
            None => value,
        };

        serde_json::from_value(value)
            .map_err(|e| PipelineError::parse(format!("Invalid notification: {}", e)))
    }
}

/// Position of a message in the log, committed once the message is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Messages that flow from the consumer to the orchestrator.
#[derive(Debug)]
pub enum StreamMessage {
    /// A decoded notification and the offset to commit after handling it.
    Notification {
        notification: Notification,
        offset: MessageOffset,
    },
    /// Stream has ended.
    End,
    /// An error occurred.
    Error(String),
}
