//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `IndexSink`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, DeleteParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::IndexConfig;
use crate::errors::SearchError;
use crate::interfaces::IndexSink;
use crate::opensearch::{index_config, queries};
use crate::types::{BulkItemResult, BulkSummary};
use instance_indexer_shared::{FilterExpr, InstanceDocument, InstanceSchema};

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// use instance_indexer_repository::{IndexConfig, IndexSink, OpenSearchClient};
///
/// let client = OpenSearchClient::new("http://localhost:9200", IndexConfig::default()).await?;
/// client.ensure_index_exists().await?;
/// client.upsert(&document).await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index name and creation settings
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            index = %index_config.index_name,
            "Created OpenSearch client"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    fn index_name(&self) -> &str {
        &self.index_config.index_name
    }

    /// Parse a search hit's `_source` into a document.
    ///
    /// Returns `None` for hits whose source is missing or not an instance document.
    fn parse_hit(hit: &Value) -> Option<InstanceDocument> {
        let source = hit.get("_source")?;
        serde_json::from_value(source.clone()).ok()
    }

    /// Extract per-item results from a bulk response body.
    ///
    /// Items are matched to documents by position. A document the response
    /// has no item for is reported as failed.
    fn parse_bulk_items(body: &Value, documents: &[InstanceDocument]) -> Vec<BulkItemResult> {
        let items = body
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();

        documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let Some(item) = items.get(i).and_then(|item| item.get("index")) else {
                    return BulkItemResult::failed(
                        &doc.id,
                        SearchError::index("no item in bulk response"),
                    );
                };

                match item.get("error") {
                    Some(err) => BulkItemResult::failed(&doc.id, SearchError::index(err.to_string())),
                    None => BulkItemResult::ok(&doc.id),
                }
            })
            .collect()
    }
}

#[async_trait]
impl IndexSink for OpenSearchClient {
    /// Write the whole document under its id, replacing any previous version.
    #[instrument(skip(self, document), fields(id = %document.id))]
    async fn upsert(&self, document: &InstanceDocument) -> Result<(), SearchError> {
        let body =
            serde_json::to_value(document).map_err(|e| SearchError::serialization(e.to_string()))?;

        let response = self
            .client
            .index(IndexParts::IndexId(self.index_name(), &document.id))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(SearchError::index(format!(
                "Index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(id = %document.id, "Document indexed");
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        documents: &[InstanceDocument],
    ) -> Result<BulkSummary, SearchError> {
        if documents.is_empty() {
            return Ok(BulkSummary::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            let source =
                serde_json::to_value(doc).map_err(|e| SearchError::serialization(e.to_string()))?;
            body.push(json!({ "index": { "_index": self.index_name(), "_id": doc.id } }).into());
            body.push(source.into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(self.index_name()))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::bulk_index(format!(
                "Bulk failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let summary = BulkSummary::from_results(Self::parse_bulk_items(&response_body, documents));

        debug!(
            total = summary.total,
            failed = summary.failed,
            "Bulk upsert completed"
        );
        Ok(summary)
    }

    /// Delete a document. A 404 means it was already gone and counts as success.
    async fn delete(&self, id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(self.index_name(), id))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - document may not exist
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Delete request failed");
            return Err(SearchError::delete(format!(
                "Delete failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(id = %id, "Document deleted");
        Ok(())
    }

    async fn query(
        &self,
        filter: &FilterExpr,
        text: Option<&str>,
        size: usize,
    ) -> Result<Vec<InstanceDocument>, SearchError> {
        let body = queries::build_filtered_query(filter, text, size);

        let response = self
            .client
            .search(SearchParts::Index(&[self.index_name()]))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let hits = response_body["hits"]["hits"]
            .as_array()
            .map(|hits| hits.iter().filter_map(Self::parse_hit).collect())
            .unwrap_or_default();

        Ok(hits)
    }

    async fn scan_ids(&self, filter: &FilterExpr) -> Result<Vec<String>, SearchError> {
        let page_size = self.index_config.scan_page_size;
        let mut ids = Vec::new();
        let mut search_after: Option<String> = None;

        loop {
            let body = queries::build_id_scan_query(filter, page_size, search_after.as_deref());

            let response = self
                .client
                .search(SearchParts::Index(&[self.index_name()]))
                .body(body)
                .send()
                .await
                .map_err(|e| SearchError::connection(e.to_string()))?;

            let status = response.status_code();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(SearchError::query(format!(
                    "Id scan failed with status {}: {}",
                    status, error_body
                )));
            }

            let response_body: Value = response
                .json()
                .await
                .map_err(|e| SearchError::parse(e.to_string()))?;

            let page: Vec<String> = response_body["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|hit| hit["_id"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            // A short page is the last one; a full page needs one more request
            let done = page.len() < page_size;
            search_after = page.last().cloned();
            ids.extend(page);

            if done || search_after.is_none() {
                break;
            }
        }

        debug!(count = ids.len(), "Scanned document ids");
        Ok(ids)
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index_name()]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(index = %self.index_name(), "Index already exists");
            return Ok(());
        }

        let settings = index_config::index_settings(&self.index_config, &InstanceSchema);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(self.index_name()))
            .body(settings)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another process may have created it between the check and the create
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(SearchError::index_creation(format!(
                "Index creation failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %self.index_name(), "Created index");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(opensearch::cluster::ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let status = health["status"].as_str().unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster health");
        Ok(status == "green" || status == "yellow")
    }
}
