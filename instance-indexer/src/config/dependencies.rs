//! Dependency initialization and wiring for the instance indexer.

use std::sync::Arc;
use tracing::info;

use crate::config::IndexerConfig;
use crate::IndexingError;
use instance_indexer_pipeline::{
    consumer::KafkaConsumer,
    enumerator::ComputeClient,
    orchestrator::Orchestrator,
    resync::CatchUpJob,
    InstancePlugin,
};
use instance_indexer_repository::{IndexSink, OpenSearchClient};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: IndexerConfig,
    /// The instance plugin wired to OpenSearch and the compute API.
    pub plugin: Arc<InstancePlugin>,
}

impl Dependencies {
    /// Initialize all dependencies from the given configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a client cannot be built or OpenSearch is unhealthy
    pub async fn new(config: IndexerConfig) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %config.opensearch_url,
            index_name = %config.index.index_name,
            compute_api_url = %config.compute.endpoint,
            "Initializing dependencies"
        );

        let search_client = OpenSearchClient::new(&config.opensearch_url, config.index.clone())
            .await
            .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?;

        // Verify OpenSearch is reachable
        let healthy = search_client
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let compute_client =
            ComputeClient::new(config.compute.clone(), config.compute_client.clone()).map_err(
                |e| IndexingError::config(format!("Failed to create compute API client: {}", e)),
            )?;

        let plugin = InstancePlugin::new(
            Arc::new(search_client),
            Arc::new(compute_client),
            config.index.clone(),
        );

        Ok(Self {
            config,
            plugin: Arc::new(plugin),
        })
    }

    /// Build the event path: Kafka consumer feeding the plugin.
    pub fn orchestrator(&self) -> Result<Orchestrator, IndexingError> {
        let consumer = KafkaConsumer::new(
            &self.config.kafka_broker,
            &self.config.kafka_group_id,
            &self.config.notification_topic,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;

        info!("Kafka consumer created");

        Ok(Orchestrator::new(consumer, self.plugin.clone()))
    }

    /// Build the catch-up job.
    pub fn catch_up_job(&self) -> CatchUpJob {
        self.plugin.catch_up_job(self.config.resync.clone())
    }
}
