//! Compute API resource shapes returned by `GET /servers/detail`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A server (instance) as listed by the compute API.
///
/// Every field is optional at the wire level; the mapper decides which ones
/// are required to build a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    /// Addresses keyed by network name.
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
    #[serde(
        rename = "OS-EXT-AZ:availability_zone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub availability_zone: Option<String>,
    /// Servers booted from a volume report the image as an empty string.
    #[serde(default, deserialize_with = "ref_or_empty")]
    pub image: Option<ResourceRef>,
    #[serde(default, deserialize_with = "ref_or_empty")]
    pub flavor: Option<ResourceRef>,
}

/// A single address on a server network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(default)]
    pub version: Option<u8>,
}

/// Reference to a related resource (image, flavor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

fn ref_or_empty<'de, D>(deserializer: D) -> Result<Option<ResourceRef>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Ref(ResourceRef),
        Other(serde_json::Value),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Ref(reference)) => Some(reference),
        Some(Raw::Other(_)) | None => None,
    })
}

/// One page of a server listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerPage {
    #[serde(default)]
    pub servers: Vec<ServerResource>,
    #[serde(default)]
    pub servers_links: Vec<PageLink>,
}

impl ServerPage {
    /// Whether the API advertises a following page.
    pub fn has_next(&self) -> bool {
        self.servers_links.iter().any(|link| link.rel == "next")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageLink {
    pub rel: String,
    pub href: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_server() {
        let server: ServerResource = serde_json::from_value(json!({
            "id": "i1",
            "name": "vm1",
            "status": "ACTIVE",
            "tenant_id": "t1",
            "created": "2024-01-01T00:00:00Z",
            "updated": "2024-01-02T00:00:00Z",
            "OS-EXT-AZ:availability_zone": "nova",
            "addresses": {
                "private": [
                    { "addr": "10.0.0.3", "version": 4 },
                    { "addr": "fd00::3", "version": 6 }
                ]
            },
            "image": { "id": "im1", "links": [] },
            "flavor": { "id": "f1", "links": [] }
        }))
        .unwrap();

        assert_eq!(server.availability_zone.as_deref(), Some("nova"));
        assert_eq!(server.image, Some(ResourceRef::new("im1")));
        assert_eq!(server.addresses["private"].len(), 2);
    }

    #[test]
    fn test_boot_from_volume_image_is_none() {
        let server: ServerResource = serde_json::from_value(json!({
            "id": "i1",
            "image": "",
            "flavor": { "id": "f1" }
        }))
        .unwrap();

        assert!(server.image.is_none());
        assert_eq!(server.flavor, Some(ResourceRef::new("f1")));
    }

    #[test]
    fn test_page_next_link() {
        let page: ServerPage = serde_json::from_value(json!({
            "servers": [],
            "servers_links": [{ "rel": "next", "href": "http://compute/servers/detail?marker=i9" }]
        }))
        .unwrap();
        assert!(page.has_next());

        let page: ServerPage = serde_json::from_value(json!({ "servers": [] })).unwrap();
        assert!(!page.has_next());
    }
}
