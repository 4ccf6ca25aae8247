//! Catch-up job.
//!
//! Seeds or repairs the index from a full listing of the compute service,
//! then optionally sweeps documents whose instance no longer exists.
//!
//! The sweep only deletes documents the listing could have vouched for:
//! documents last written before the run started, and, when the listing is
//! limited to the caller's tenant, documents of owners seen in the listing.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::enumerator::InstanceSource;
use crate::errors::PipelineError;
use crate::loader::{LoaderConfig, SearchLoader};
use crate::processor::{mapper, Clock};
use instance_indexer_repository::IndexSink;
use instance_indexer_shared::{FilterExpr, DOCUMENT_KIND};

/// Configuration for a catch-up run.
#[derive(Debug, Clone)]
pub struct ResyncConfig {
    /// Delete indexed instances missing from the listing.
    pub sweep: bool,
    pub loader: LoaderConfig,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            sweep: true,
            loader: LoaderConfig::default(),
        }
    }
}

/// Counts reported by a catch-up run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    /// Instances returned by the compute listing.
    pub listed: usize,
    /// Documents written to the index.
    pub indexed: usize,
    /// Listed instances that could not be mapped.
    pub skipped: usize,
    /// Stale documents deleted by the sweep.
    pub swept: usize,
}

/// Full listing, mapping and bulk load of every instance.
pub struct CatchUpJob {
    source: Arc<dyn InstanceSource>,
    sink: Arc<dyn IndexSink>,
    config: ResyncConfig,
    clock: Clock,
}

impl CatchUpJob {
    pub fn new(
        source: Arc<dyn InstanceSource>,
        sink: Arc<dyn IndexSink>,
        config: ResyncConfig,
    ) -> Self {
        Self::with_clock(source, sink, config, Arc::new(Utc::now))
    }

    /// Create a job with a custom clock for the run start instant.
    pub fn with_clock(
        source: Arc<dyn InstanceSource>,
        sink: Arc<dyn IndexSink>,
        config: ResyncConfig,
        clock: Clock,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            clock,
        }
    }

    /// Run the job once.
    ///
    /// A listing failure aborts the run before anything is written. An
    /// instance that fails mapping is skipped, but its id still counts as
    /// live, so the sweep never removes an instance because one listing of
    /// it was malformed. The sweep only runs after a complete load.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ResyncSummary, PipelineError> {
        let started_at = (self.clock)();
        let resources = self.source.list_all().await?;

        let mut summary = ResyncSummary {
            listed: resources.len(),
            ..Default::default()
        };
        let mut live: HashSet<String> = HashSet::with_capacity(resources.len());
        let mut owners: BTreeSet<String> = BTreeSet::new();
        let mut documents = Vec::with_capacity(resources.len());

        for resource in &resources {
            if let Some(id) = &resource.id {
                live.insert(id.clone());
            }
            if let Some(owner) = &resource.tenant_id {
                owners.insert(owner.clone());
            }
            match mapper::from_resource(resource) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(
                        instance_id = resource.id.as_deref().unwrap_or("<unknown>"),
                        error = %e,
                        "Skipping instance that could not be mapped"
                    );
                    summary.skipped += 1;
                }
            }
        }

        let mut loader = SearchLoader::with_config(self.sink.clone(), self.config.loader.clone());
        let load_result = match loader.load(documents).await {
            Ok(()) => loader.flush().await,
            Err(e) => Err(e),
        };
        summary.indexed = loader.indexed();
        load_result?;

        if self.config.sweep {
            summary.swept = match self.sweep_filter(&owners, started_at) {
                Some(filter) => self.sweep(&filter, &live).await?,
                None => {
                    debug!("Listing saw no owners, skipping sweep");
                    0
                }
            };
        }

        info!(
            listed = summary.listed,
            indexed = summary.indexed,
            skipped = summary.skipped,
            swept = summary.swept,
            "Catch-up run complete"
        );

        Ok(summary)
    }

    /// Documents eligible for the sweep, or `None` when nothing is.
    ///
    /// Documents written after `started_at` came from the event path during
    /// this run and the listing says nothing about them.
    fn sweep_filter(
        &self,
        owners: &BTreeSet<String>,
        started_at: DateTime<Utc>,
    ) -> Option<FilterExpr> {
        let mut parts = vec![
            FilterExpr::term("doc_kind", DOCUMENT_KIND),
            FilterExpr::before("updated", started_at),
        ];

        if !self.source.lists_all_tenants() {
            if owners.is_empty() {
                return None;
            }
            parts.push(FilterExpr::terms("owner", owners.iter().cloned()));
        }

        Some(FilterExpr::And(parts))
    }

    async fn sweep(
        &self,
        filter: &FilterExpr,
        live: &HashSet<String>,
    ) -> Result<usize, PipelineError> {
        let indexed_ids = self.sink.scan_ids(filter).await?;
        let mut swept = 0;

        for id in indexed_ids.iter().filter(|id| !live.contains(*id)) {
            info!(instance_id = %id, "Deleting stale instance document");
            self.sink.delete(id).await?;
            swept += 1;
        }

        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::{ResourceRef, ServerResource};
    use crate::errors::TransportError;
    use crate::processor::{NotificationRouter, INSTANCE_UPDATE_EVENT};
    use crate::test_support::{instance_update_payload, MockIndexSink};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use instance_indexer_repository::SearchError;
    use instance_indexer_shared::InstanceDocument;
    use std::sync::atomic::Ordering;

    struct StaticSource(Vec<ServerResource>);

    #[async_trait]
    impl InstanceSource for StaticSource {
        async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
            Ok(self.0.clone())
        }

        fn lists_all_tenants(&self) -> bool {
            true
        }
    }

    /// Listing limited to the caller's own tenant.
    struct TenantSource(Vec<ServerResource>);

    #[async_trait]
    impl InstanceSource for TenantSource {
        async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
            Ok(self.0.clone())
        }

        fn lists_all_tenants(&self) -> bool {
            false
        }
    }

    /// Delivers an update event through the router while the listing runs.
    struct EventDuringListing {
        servers: Vec<ServerResource>,
        router: NotificationRouter,
        instance_id: &'static str,
    }

    #[async_trait]
    impl InstanceSource for EventDuringListing {
        async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
            let mut payload = instance_update_payload();
            payload["instance_id"] = self.instance_id.into();
            self.router
                .process(INSTANCE_UPDATE_EVENT, &payload)
                .await
                .unwrap();
            Ok(self.servers.clone())
        }

        fn lists_all_tenants(&self) -> bool {
            true
        }
    }

    struct DownSource;

    #[async_trait]
    impl InstanceSource for DownSource {
        async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
            Err(TransportError::Unreachable("connection refused".to_string()))
        }

        fn lists_all_tenants(&self) -> bool {
            true
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn fixed_clock(instant: DateTime<Utc>) -> Clock {
        Arc::new(move || instant)
    }

    fn owned_by(id: &str, owner: &str) -> InstanceDocument {
        InstanceDocument::new(id, format!("vm-{}", id), "active", owner)
    }

    fn server(id: &str) -> ServerResource {
        ServerResource {
            id: Some(id.to_string()),
            name: Some(format!("vm-{}", id)),
            status: Some("ACTIVE".to_string()),
            tenant_id: Some("t1".to_string()),
            flavor: Some(ResourceRef::new("f1")),
            ..Default::default()
        }
    }

    fn config(sweep: bool) -> ResyncConfig {
        ResyncConfig {
            sweep,
            loader: LoaderConfig {
                batch_size: 2,
                max_retries: 1,
                initial_retry_delay_ms: 1,
                max_retry_delay_ms: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_run_indexes_every_instance() {
        let sink = Arc::new(MockIndexSink::new());
        let source = Arc::new(StaticSource(vec![server("i1"), server("i2"), server("i3")]));

        let summary = CatchUpJob::new(source, sink.clone(), config(false))
            .run()
            .await
            .unwrap();

        assert_eq!(
            summary,
            ResyncSummary {
                listed: 3,
                indexed: 3,
                skipped: 0,
                swept: 0
            }
        );
        assert_eq!(sink.get("i1").unwrap().status, "active");
        assert_eq!(sink.bulk_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sweep_deletes_stale_and_keeps_malformed() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![
            InstanceDocument::new("i1", "vm-i1", "active", "t1"),
            InstanceDocument::new("gone", "vm-gone", "active", "t1"),
            InstanceDocument::new("broken", "vm-broken", "active", "t1"),
        ]));
        let mut broken = server("broken");
        broken.tenant_id = None;
        let source = Arc::new(StaticSource(vec![server("i1"), broken]));

        let summary = CatchUpJob::new(source, sink.clone(), config(true))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.listed, 2);
        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.swept, 1);
        assert_eq!(sink.ids(), vec!["broken".to_string(), "i1".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_disabled_keeps_stale() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![InstanceDocument::new(
            "gone", "vm-gone", "active", "t1",
        )]));
        let source = Arc::new(StaticSource(vec![server("i1")]));

        let summary = CatchUpJob::new(source, sink.clone(), config(false))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.swept, 0);
        assert_eq!(sink.ids().len(), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_writes_nothing() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![InstanceDocument::new(
            "i1", "vm-i1", "active", "t1",
        )]));

        let err = CatchUpJob::new(Arc::new(DownSource), sink.clone(), config(true))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transport(_)));
        assert_eq!(sink.write_calls(), 0);
        assert_eq!(sink.ids(), vec!["i1".to_string()]);
    }

    #[tokio::test]
    async fn test_load_failure_skips_sweep() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![InstanceDocument::new(
            "gone", "vm-gone", "active", "t1",
        )]));
        sink.fail_with(vec![
            SearchError::bulk_index("mapper_parsing_exception"),
            SearchError::index("mapper_parsing_exception"),
        ]);
        let source = Arc::new(StaticSource(vec![server("i1")]));

        let err = CatchUpJob::new(source, sink.clone(), config(true))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::LoaderError(_)));
        assert_eq!(sink.delete_calls.load(Ordering::SeqCst), 0);
        assert!(sink.get("gone").is_some());
    }

    #[tokio::test]
    async fn test_tenant_listing_keeps_other_tenants() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![
            owned_by("b1", "t2"),
            owned_by("gone", "t1"),
        ]));
        let source = Arc::new(TenantSource(vec![server("a1")]));

        let summary = CatchUpJob::new(source, sink.clone(), config(true))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.swept, 1);
        assert!(sink.get("b1").is_some());
        assert!(sink.get("gone").is_none());
        assert!(sink.get("a1").is_some());
    }

    #[tokio::test]
    async fn test_empty_tenant_listing_skips_sweep() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![owned_by("b1", "t2")]));
        let source = Arc::new(TenantSource(Vec::new()));

        let summary = CatchUpJob::new(source, sink.clone(), config(true))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.swept, 0);
        assert_eq!(sink.delete_calls.load(Ordering::SeqCst), 0);
        assert!(sink.get("b1").is_some());
    }

    #[tokio::test]
    async fn test_sweep_keeps_documents_written_during_run() {
        let sink = Arc::new(MockIndexSink::with_documents(vec![owned_by("gone", "t1")]));
        let source = Arc::new(EventDuringListing {
            servers: vec![server("i1")],
            router: NotificationRouter::with_clock(sink.clone(), fixed_clock(at(5))),
            instance_id: "i9",
        });

        let summary = CatchUpJob::with_clock(source, sink.clone(), config(true), fixed_clock(at(0)))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.swept, 1);
        assert_eq!(sink.get("i9").unwrap().updated, Some(at(5)));
        assert_eq!(sink.ids(), vec!["i1".to_string(), "i9".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_deletes_documents_written_before_run() {
        let mut stale = owned_by("gone", "t1");
        stale.updated = Some(at(-60));
        let sink = Arc::new(MockIndexSink::with_documents(vec![stale]));
        let source = Arc::new(StaticSource(vec![server("i1")]));

        let summary = CatchUpJob::with_clock(source, sink.clone(), config(true), fixed_clock(at(0)))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.swept, 1);
        assert!(sink.get("gone").is_none());
    }
}
