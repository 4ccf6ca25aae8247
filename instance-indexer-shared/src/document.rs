//! The canonical instance document.
//!
//! Both write paths (bulk listing and lifecycle notifications) produce this
//! shape. Fields a path cannot populate stay `None` and are left out of the
//! serialized body entirely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::DOCUMENT_KIND;

/// A compute instance as stored in the search index.
///
/// `id` and `instance_id` always hold the same value. Every write replaces the
/// whole document stored under `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDocument {
    /// Document id, equal to the instance's unique identifier.
    pub id: String,
    /// Denormalized copy of `id` used by filters.
    pub instance_id: String,
    /// Document kind; always [`DOCUMENT_KIND`].
    #[serde(default = "default_kind")]
    pub doc_kind: String,
    pub name: String,
    pub status: String,
    /// Tenant (project) owning the instance.
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<FlavorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    /// Network attachments. Only the bulk listing carries addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i64>,
}

fn default_kind() -> String {
    DOCUMENT_KIND.to_string()
}

impl InstanceDocument {
    /// Create a document with its identity and descriptive fields set.
    ///
    /// `instance_id` mirrors `id` and `doc_kind` is fixed to the instance kind.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            instance_id: id.clone(),
            id,
            doc_kind: default_kind(),
            name: name.into(),
            status: status.into(),
            owner: owner.into(),
            availability_zone: None,
            created: None,
            updated: None,
            flavor: None,
            image: None,
            networks: Vec::new(),
            state_description: None,
            vcpus: None,
            disk_gb: None,
            memory_mb: None,
        }
    }
}

/// Flavor reference. The bulk path only knows the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FlavorRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Image reference, enriched with image metadata on the event path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_disk: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ram: Option<i64>,
}

impl ImageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kernel_id: None,
            container_format: None,
            disk_format: None,
            min_disk: None,
            min_ram: None,
        }
    }
}

/// A single IPv4 address on a named network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
    pub ipv4: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_mirrors_id() {
        let doc = InstanceDocument::new("i1", "vm1", "active", "t1");

        assert_eq!(doc.id, "i1");
        assert_eq!(doc.instance_id, "i1");
        assert_eq!(doc.doc_kind, DOCUMENT_KIND);
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let doc = InstanceDocument::new("i1", "vm1", "active", "t1");
        let value = serde_json::to_value(&doc).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("networks"));
        assert!(!object.contains_key("image"));
        assert!(!object.contains_key("vcpus"));
        assert_eq!(value["doc_kind"], "instance");
    }

    #[test]
    fn test_deserialize_without_kind_defaults() {
        let doc: InstanceDocument = serde_json::from_value(json!({
            "id": "i1",
            "instance_id": "i1",
            "name": "vm1",
            "status": "active",
            "owner": "t1",
            "flavor": { "id": "f1" }
        }))
        .unwrap();

        assert_eq!(doc.doc_kind, DOCUMENT_KIND);
        assert_eq!(doc.flavor, Some(FlavorRef::new("f1")));
        assert!(doc.networks.is_empty());
    }
}
