//! Consumer module for the instance indexer pipeline.
//!
//! Receives compute notifications from Kafka.

mod kafka_consumer;
mod messages;

pub use kafka_consumer::{
    notification_topic_name, KafkaConsumer, NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY,
};
pub use messages::{MessageOffset, Notification, StreamMessage};
