//! Orchestrator module for the instance indexer pipeline.
//!
//! Feeds notifications from the consumer to the plugin one at a time and
//! commits each offset once the notification is handled.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument};

use crate::consumer::{KafkaConsumer, Notification, StreamMessage};
use crate::errors::PipelineError;
use crate::plugin::InstancePlugin;
use crate::processor::NotificationResult;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
        }
    }
}

/// Orchestrator that coordinates the event path.
pub struct Orchestrator {
    consumer: Arc<KafkaConsumer>,
    plugin: Arc<InstancePlugin>,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(consumer: KafkaConsumer, plugin: Arc<InstancePlugin>) -> Self {
        Self::with_config(consumer, plugin, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: KafkaConsumer,
        plugin: Arc<InstancePlugin>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            consumer: Arc::new(consumer),
            plugin,
            config,
            shutdown_tx,
        }
    }

    /// Run the orchestrator.
    ///
    /// Blocks until a shutdown signal is received or the stream ends. A
    /// notification being handled when shutdown arrives runs to completion.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!("Starting instance indexer orchestrator");

        self.plugin.ensure_index().await?;
        self.consumer.subscribe()?;

        let (tx, mut rx) = mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        let consumer = self.consumer.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        let consumer_handle = tokio::spawn(async move {
            if let Err(e) = consumer.run(tx, shutdown_rx).await {
                error!(error = %e, "Consumer error");
            }
        });

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(StreamMessage::Notification { notification, offset }) => {
                            dispatch(&self.plugin, &notification).await;
                            if let Err(e) = self.consumer.commit(&offset) {
                                error!(error = %e, offset = offset.offset, "Failed to commit offset");
                            }
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
            }
        }

        let _ = consumer_handle.await;

        info!("Orchestrator shutdown complete");
        Ok(())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Hand one notification to the plugin.
async fn dispatch(plugin: &InstancePlugin, notification: &Notification) -> NotificationResult {
    debug!(
        event_type = %notification.event_type,
        message_id = notification.message_id.as_deref().unwrap_or(""),
        publisher_id = notification.publisher_id.as_deref().unwrap_or(""),
        "Dispatching notification"
    );
    plugin
        .handle_notification(&notification.event_type, &notification.payload)
        .await
}
