//! Processor module for the instance indexer pipeline.
//!
//! Maps compute payloads into instance documents and routes notifications.

pub mod mapper;
mod router;

pub use router::{
    Clock, InstanceEvent, NotificationOutcome, NotificationResult, NotificationRouter,
    INSTANCE_DELETE_EVENT, INSTANCE_UPDATE_EVENT, SUPPORTED_EVENT_TYPES,
};
