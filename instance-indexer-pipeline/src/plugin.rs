//! Instance plugin.
//!
//! The single surface the indexing service sees for compute instances:
//! index identity, schema, access filter, both write paths and filtered
//! search.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::consumer::{NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY};
use crate::enumerator::{InstanceSource, ServerResource};
use crate::errors::{MappingError, TransportError};
use crate::processor::{mapper, NotificationResult, NotificationRouter, SUPPORTED_EVENT_TYPES};
use crate::resync::{CatchUpJob, ResyncConfig};
use instance_indexer_repository::opensearch::index_config;
use instance_indexer_repository::{IndexConfig, IndexSink, SearchError};
use instance_indexer_shared::{access_filter, FilterExpr, InstanceDocument, InstanceSchema};

/// Search plugin for compute instances.
pub struct InstancePlugin {
    sink: Arc<dyn IndexSink>,
    source: Arc<dyn InstanceSource>,
    router: NotificationRouter,
    index_config: IndexConfig,
    schema: InstanceSchema,
}

impl InstancePlugin {
    pub fn new(
        sink: Arc<dyn IndexSink>,
        source: Arc<dyn InstanceSource>,
        index_config: IndexConfig,
    ) -> Self {
        Self {
            router: NotificationRouter::new(sink.clone()),
            sink,
            source,
            index_config,
            schema: InstanceSchema,
        }
    }

    /// Replace the notification router, e.g. to pin its clock.
    pub fn with_router(mut self, router: NotificationRouter) -> Self {
        self.router = router;
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_config.index_name
    }

    pub fn document_kind(&self) -> &'static str {
        self.schema.document_kind()
    }

    pub fn schema(&self) -> &InstanceSchema {
        &self.schema
    }

    /// Index settings and mappings rendered for the search engine.
    pub fn index_settings(&self) -> Value {
        index_config::index_settings(&self.index_config, &self.schema)
    }

    pub fn access_filter(&self, owner: &str) -> FilterExpr {
        access_filter(owner)
    }

    /// List every instance from the compute service.
    pub async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
        self.source.list_all().await
    }

    pub fn map(&self, resource: &ServerResource) -> Result<InstanceDocument, MappingError> {
        mapper::from_resource(resource)
    }

    /// Exchange and routing key compute notifications are published on.
    pub fn notification_topic(&self) -> (&'static str, &'static str) {
        (NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY)
    }

    pub fn supported_event_types(&self) -> &'static [&'static str] {
        &SUPPORTED_EVENT_TYPES
    }

    pub async fn handle_notification(&self, event_type: &str, payload: &Value) -> NotificationResult {
        self.router.handle_notification(event_type, payload).await
    }

    /// Search the caller's instances.
    ///
    /// The access filter for `owner` is always applied; there is no way to
    /// query across owners through the plugin.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        owner: &str,
        text: Option<&str>,
        size: usize,
    ) -> Result<Vec<InstanceDocument>, SearchError> {
        self.sink.query(&access_filter(owner), text, size).await
    }

    /// Create the index with this plugin's settings if it is missing.
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        self.sink.ensure_index_exists().await
    }

    /// Build a catch-up job over this plugin's source and sink.
    pub fn catch_up_job(&self, config: ResyncConfig) -> CatchUpJob {
        CatchUpJob::new(self.source.clone(), self.sink.clone(), config)
    }
}
