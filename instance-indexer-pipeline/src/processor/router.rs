//! Notification router.
//!
//! Dispatches instance lifecycle notifications to the matching index write.
//! The router is stateless between calls and handles one event at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::errors::HandlingError;
use crate::processor::mapper;
use instance_indexer_repository::IndexSink;

/// Event type emitted on instance state or attribute changes.
///
/// This is the name the compute service puts on the bus. The shorthand
/// `instance-update` is not an event type and is ignored like any other
/// unknown name.
pub const INSTANCE_UPDATE_EVENT: &str = "compute.instance.update";

/// Event type emitted once an instance has been deleted.
pub const INSTANCE_DELETE_EVENT: &str = "compute.instance.delete.end";

/// Event types the router acts on.
pub const SUPPORTED_EVENT_TYPES: [&str; 2] = [INSTANCE_UPDATE_EVENT, INSTANCE_DELETE_EVENT];

/// Instance lifecycle events, parsed from the notification's event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// Create-or-update of an instance.
    Update,
    /// The instance is gone.
    Delete,
    /// Any other event type. Accepted and ignored.
    Unrecognized(String),
}

impl InstanceEvent {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            INSTANCE_UPDATE_EVENT => Self::Update,
            INSTANCE_DELETE_EVENT => Self::Delete,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// What a successfully processed notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Upserted { instance_id: String },
    Deleted { instance_id: String },
    Ignored { event_type: String },
}

/// Signal returned to the message bus.
///
/// The consumer commits the offset for every variant. There is no
/// redelivery signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationResult {
    /// The index was updated.
    Handled,
    /// The event type is not one the router acts on.
    Ignored,
    /// Handling failed; the failure was logged and the event discarded.
    Dropped,
}

/// Source of the current instant, injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Routes notifications to index writes.
pub struct NotificationRouter {
    sink: Arc<dyn IndexSink>,
    clock: Clock,
}

impl NotificationRouter {
    /// Create a router writing to `sink`, stamping documents with the wall clock.
    pub fn new(sink: Arc<dyn IndexSink>) -> Self {
        Self::with_clock(sink, Arc::new(Utc::now))
    }

    /// Create a router with a custom clock for the `updated` stamp.
    pub fn with_clock(sink: Arc<dyn IndexSink>, clock: Clock) -> Self {
        Self { sink, clock }
    }

    /// Process one notification and report exactly what happened.
    ///
    /// Update events are mapped and upserted under the instance id; delete
    /// events delete that id; anything else is ignored without touching the
    /// index.
    #[instrument(skip(self, payload))]
    pub async fn process(
        &self,
        event_type: &str,
        payload: &Value,
    ) -> Result<NotificationOutcome, HandlingError> {
        match InstanceEvent::parse(event_type) {
            InstanceEvent::Update => {
                let doc = mapper::from_notification(payload, (self.clock)())?;
                self.sink.upsert(&doc).await?;
                Ok(NotificationOutcome::Upserted {
                    instance_id: doc.id,
                })
            }
            InstanceEvent::Delete => {
                let instance_id = mapper::delete_target(payload)?;
                self.sink.delete(&instance_id).await?;
                Ok(NotificationOutcome::Deleted { instance_id })
            }
            InstanceEvent::Unrecognized(event_type) => {
                Ok(NotificationOutcome::Ignored { event_type })
            }
        }
    }

    /// Handle one notification at the message bus boundary.
    ///
    /// Failures are logged once and the event is still acknowledged: a
    /// malformed event must never block or requeue the stream. The price is
    /// that a failed event leaves the index untouched.
    pub async fn handle_notification(&self, event_type: &str, payload: &Value) -> NotificationResult {
        let instance_id = payload
            .get("instance_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");

        match self.process(event_type, payload).await {
            Ok(NotificationOutcome::Upserted { instance_id }) => {
                debug!(event_type = %event_type, instance_id = %instance_id, "Indexed instance");
                NotificationResult::Handled
            }
            Ok(NotificationOutcome::Deleted { instance_id }) => {
                debug!(event_type = %event_type, instance_id = %instance_id, "Deleted instance");
                NotificationResult::Handled
            }
            Ok(NotificationOutcome::Ignored { event_type }) => {
                debug!(event_type = %event_type, "Ignoring unsupported event");
                NotificationResult::Ignored
            }
            Err(HandlingError::Internal(msg)) => {
                error!(
                    event_type = %event_type,
                    instance_id = %instance_id,
                    error = %msg,
                    "Internal error while handling notification (bug)"
                );
                NotificationResult::Dropped
            }
            Err(e) => {
                error!(
                    event_type = %event_type,
                    instance_id = %instance_id,
                    error = %e,
                    "Failed to handle notification"
                );
                NotificationResult::Dropped
            }
        }
    }
}
