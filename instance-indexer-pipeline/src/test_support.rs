//! Test fixtures shared across pipeline modules.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use instance_indexer_repository::{BulkItemResult, BulkSummary, IndexSink, SearchError};
use instance_indexer_shared::{FilterExpr, InstanceDocument};

/// A well-formed `compute.instance.update` payload for instance `i1`.
pub fn instance_update_payload() -> Value {
    json!({
        "instance_id": "i1",
        "display_name": "vm1",
        "state": "active",
        "tenant_id": "t1",
        "created_at": "2024-01-01 00:00:00",
        "availability_zone": "nova",
        "image_meta": {
            "base_image_ref": "im1",
            "kernel_id": "",
            "container_format": "bare",
            "disk_format": "qcow2",
            "min_disk": "20",
            "min_ram": "0"
        },
        "instance_flavor_id": "f1",
        "instance_type": "m1.small",
        "state_description": "",
        "vcpus": 1,
        "disk_gb": 20,
        "memory_mb": 2048
    })
}

/// In-memory index sink recording every call.
#[derive(Default)]
pub struct MockIndexSink {
    pub documents: Mutex<BTreeMap<String, InstanceDocument>>,
    pub upsert_calls: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Errors returned, in order, by the next write calls.
    pub failures: Mutex<Vec<SearchError>>,
}

impl MockIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed documents without counting calls.
    pub fn with_documents(documents: Vec<InstanceDocument>) -> Self {
        let sink = Self::new();
        {
            let mut stored = sink.documents.lock().unwrap();
            for doc in documents {
                stored.insert(doc.id.clone(), doc);
            }
        }
        sink
    }

    /// Make the next write calls fail with the given errors.
    pub fn fail_with(&self, errors: Vec<SearchError>) {
        *self.failures.lock().unwrap() = errors;
    }

    pub fn get(&self, id: &str) -> Option<InstanceDocument> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.lock().unwrap().keys().cloned().collect()
    }

    pub fn write_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
            + self.bulk_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<SearchError> {
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            None
        } else {
            Some(failures.remove(0))
        }
    }

    fn matches(filter: &FilterExpr, doc: &InstanceDocument) -> bool {
        let source = serde_json::to_value(doc).unwrap();
        let keyword = |field: &str| source.get(field).and_then(Value::as_str).map(str::to_string);

        match filter {
            FilterExpr::And(parts) => parts.iter().all(|p| Self::matches(p, doc)),
            FilterExpr::Term { field, value } => keyword(field).as_deref() == Some(value.as_str()),
            FilterExpr::Terms { field, values } => {
                keyword(field).is_some_and(|v| values.iter().any(|candidate| *candidate == v))
            }
            FilterExpr::Before { field, instant } => match keyword(field) {
                Some(raw) => DateTime::parse_from_rfc3339(&raw).unwrap().with_timezone(&Utc) < *instant,
                None => true,
            },
        }
    }
}

#[async_trait]
impl IndexSink for MockIndexSink {
    async fn upsert(&self, document: &InstanceDocument) -> Result<(), SearchError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        documents: &[InstanceDocument],
    ) -> Result<BulkSummary, SearchError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        let mut stored = self.documents.lock().unwrap();
        let results = documents
            .iter()
            .map(|doc| {
                stored.insert(doc.id.clone(), doc.clone());
                BulkItemResult::ok(&doc.id)
            })
            .collect();
        Ok(BulkSummary::from_results(results))
    }

    async fn delete(&self, id: &str) -> Result<(), SearchError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn query(
        &self,
        filter: &FilterExpr,
        _text: Option<&str>,
        size: usize,
    ) -> Result<Vec<InstanceDocument>, SearchError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| Self::matches(filter, doc))
            .take(size)
            .cloned()
            .collect())
    }

    async fn scan_ids(&self, filter: &FilterExpr) -> Result<Vec<String>, SearchError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| Self::matches(filter, doc))
            .map(|doc| doc.id.clone())
            .collect())
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}
