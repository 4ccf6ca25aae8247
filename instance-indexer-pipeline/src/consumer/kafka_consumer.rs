//! Kafka consumer implementation for the instance indexer.
//!
//! Consumes compute notifications and forwards them to the pipeline.

use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message as KafkaMessage},
    Offset, TopicPartitionList,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::messages::{MessageOffset, Notification, StreamMessage};
use crate::errors::PipelineError;

/// Exchange the compute service publishes notifications on.
pub const NOTIFICATION_EXCHANGE: &str = "notifications";

/// Routing key of compute notifications within the exchange.
pub const NOTIFICATION_ROUTING_KEY: &str = "nova";

/// Kafka topic name for an exchange and routing key.
pub fn notification_topic_name(exchange: &str, routing_key: &str) -> String {
    format!("{}.{}", exchange, routing_key)
}

/// Kafka consumer for compute notifications.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying compute notifications
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(PipelineError)` - If consumer creation fails
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(brokers = %brokers, group_id = %group_id, topic = %topic, "Created Kafka consumer");

        Ok(Self {
            consumer,
            topics: vec![topic.to_string()],
        })
    }

    /// Subscribe to configured topics.
    pub fn subscribe(&self) -> Result<(), PipelineError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    /// Start consuming messages and send them through the channel.
    ///
    /// Offsets of forwarded notifications are committed by the receiver via
    /// [`KafkaConsumer::commit`] once handled. Messages that cannot be decoded
    /// are logged and committed here.
    #[instrument(skip(self, sender, shutdown))]
    pub async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), PipelineError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Consumer received shutdown signal");
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            if let Err(e) = self.process_message(&msg, &sender).await {
                                error!(error = %e, "Failed to process message");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka error");
                            let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                        }
                        None => {
                            info!("Kafka stream ended");
                            let _ = sender.send(StreamMessage::End).await;
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Decode a single Kafka message and forward it.
    async fn process_message(
        &self,
        msg: &BorrowedMessage<'_>,
        sender: &mpsc::Sender<StreamMessage>,
    ) -> Result<(), PipelineError> {
        let offset = MessageOffset {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
        };

        debug!(
            topic = %offset.topic,
            partition = offset.partition,
            offset = offset.offset,
            "Processing message"
        );

        let payload = match msg.payload() {
            Some(p) => p,
            None => {
                debug!("Received message with empty payload");
                return self.commit(&offset);
            }
        };

        match Notification::decode(payload) {
            Ok(notification) => sender
                .send(StreamMessage::Notification {
                    notification,
                    offset,
                })
                .await
                .map_err(|e| PipelineError::ChannelError(e.to_string())),
            Err(e) => {
                warn!(
                    topic = %offset.topic,
                    offset = offset.offset,
                    error = %e,
                    "Dropping undecodable notification"
                );
                self.commit(&offset)
            }
        }
    }

    /// Commit the position after `offset`.
    pub fn commit(&self, offset: &MessageOffset) -> Result<(), PipelineError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&offset.topic, offset.partition, Offset::Offset(offset.offset + 1))
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| PipelineError::kafka(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_topic_name() {
        assert_eq!(
            notification_topic_name(NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY),
            "notifications.nova"
        );
    }
}
