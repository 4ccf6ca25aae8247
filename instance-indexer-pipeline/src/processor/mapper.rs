//! Document mapper.
//!
//! Two pure transforms, one per write path, producing the canonical
//! [`InstanceDocument`]. Neither performs I/O or reads the clock: the
//! notification path receives the processing instant as an argument.

use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::enumerator::ServerResource;
use crate::errors::MappingError;
use instance_indexer_shared::{FlavorRef, ImageRef, InstanceDocument, NetworkAttachment};

/// Map a server from the compute API listing.
///
/// `status` is lower-cased and `owner` comes from `tenant_id`. Flavor and
/// image are reduced to their ids; the listing carries nothing else about
/// them and no extra lookups are made.
///
/// # Errors
///
/// `MappingError::MissingField` if `id`, `name`, `status` or `tenant_id` is
/// absent, `MappingError::InvalidField` for an unparseable timestamp.
pub fn from_resource(resource: &ServerResource) -> Result<InstanceDocument, MappingError> {
    let id = require(&resource.id, "id")?;
    let name = require(&resource.name, "name")?;
    let status = require(&resource.status, "status")?;
    let tenant_id = require(&resource.tenant_id, "tenant_id")?;

    let mut doc = InstanceDocument::new(id, name, status.to_lowercase(), tenant_id);
    doc.availability_zone = resource.availability_zone.clone();
    doc.created = resource
        .created
        .as_deref()
        .map(|raw| parse_instant("created", raw))
        .transpose()?;
    doc.updated = resource
        .updated
        .as_deref()
        .map(|raw| parse_instant("updated", raw))
        .transpose()?;
    doc.flavor = resource
        .flavor
        .as_ref()
        .and_then(|f| f.id.clone())
        .map(FlavorRef::new);
    doc.image = resource
        .image
        .as_ref()
        .and_then(|i| i.id.clone())
        .map(ImageRef::new);
    doc.networks = resource
        .addresses
        .iter()
        .flat_map(|(network, addresses)| {
            addresses
                .iter()
                .filter(|a| a.version == Some(4) || a.addr.parse::<Ipv4Addr>().is_ok())
                .map(move |a| NetworkAttachment {
                    name: network.clone(),
                    ipv4: a.addr.clone(),
                })
        })
        .collect();

    Ok(doc)
}

/// Map an instance lifecycle notification payload.
///
/// `state` is stored as-is (no case change). `updated` is set to `now`, the
/// processing instant, not to any time carried by the payload, so redelivery
/// of the same event yields a newer `updated`. `created_at` arrives as
/// `"YYYY-MM-DD hh:mm:ss"` and has its date/time separator replaced with `T`
/// before parsing. The network attachments cannot be recovered from the
/// payload and are left empty. The flavor is keyed by `instance_flavor_id`;
/// without it there is no flavor, and `instance_type` is ignored.
///
/// # Errors
///
/// `MappingError::MissingField` if `instance_id`, `display_name`, `state`,
/// `tenant_id`, `created_at` or any `image_meta` field is absent.
pub fn from_notification(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<InstanceDocument, MappingError> {
    let fields = payload
        .as_object()
        .ok_or_else(|| MappingError::invalid("payload", "expected an object"))?;

    let instance_id = required_str(fields, "instance_id", "instance_id")?;
    let display_name = required_str(fields, "display_name", "display_name")?;
    let state = required_str(fields, "state", "state")?;
    let tenant_id = required_str(fields, "tenant_id", "tenant_id")?;
    let created_at = required_str(fields, "created_at", "created_at")?;

    let image_meta = match fields.get("image_meta") {
        Some(Value::Object(meta)) => meta,
        Some(Value::Null) | None => return Err(MappingError::missing("image_meta")),
        Some(_) => return Err(MappingError::invalid("image_meta", "expected an object")),
    };

    let image = ImageRef {
        id: required_str(image_meta, "base_image_ref", "image_meta.base_image_ref")?,
        kernel_id: Some(required_str(image_meta, "kernel_id", "image_meta.kernel_id")?),
        container_format: Some(required_str(
            image_meta,
            "container_format",
            "image_meta.container_format",
        )?),
        disk_format: Some(required_str(
            image_meta,
            "disk_format",
            "image_meta.disk_format",
        )?),
        min_disk: Some(required_int(image_meta, "min_disk", "image_meta.min_disk")?),
        min_ram: Some(required_int(image_meta, "min_ram", "image_meta.min_ram")?),
    };

    let mut doc = InstanceDocument::new(instance_id, display_name, state, tenant_id);
    doc.created = Some(parse_instant(
        "created_at",
        &created_at.replacen(' ', "T", 1),
    )?);
    doc.updated = Some(now);
    doc.availability_zone = optional_str(fields, "availability_zone", "availability_zone")?;
    doc.image = Some(image);
    if let Some(id) = optional_str(fields, "instance_flavor_id", "instance_flavor_id")? {
        doc.flavor = Some(FlavorRef {
            id,
            name: optional_str(fields, "instance_type", "instance_type")?,
        });
    }
    doc.state_description = optional_str(fields, "state_description", "state_description")?;
    doc.vcpus = optional_int(fields, "vcpus", "vcpus")?;
    doc.disk_gb = optional_int(fields, "disk_gb", "disk_gb")?;
    doc.memory_mb = optional_int(fields, "memory_mb", "memory_mb")?;

    Ok(doc)
}

/// Extract the instance id a delete notification refers to.
pub fn delete_target(payload: &Value) -> Result<String, MappingError> {
    let fields = payload
        .as_object()
        .ok_or_else(|| MappingError::invalid("payload", "expected an object"))?;
    required_str(fields, "instance_id", "instance_id")
}

/// Parse an instant in RFC 3339 form or as a naive ISO-8601 time in UTC.
pub(crate) fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, MappingError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MappingError::invalid(field, format!("unrecognized timestamp {:?}", raw)))
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

fn require(value: &Option<String>, field: &str) -> Result<String, MappingError> {
    value.clone().ok_or_else(|| MappingError::missing(field))
}

fn required_str(fields: &Map<String, Value>, key: &str, path: &str) -> Result<String, MappingError> {
    optional_str(fields, key, path)?.ok_or_else(|| MappingError::missing(path))
}

fn optional_str(
    fields: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, MappingError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(MappingError::invalid(
            path,
            format!("expected a string, got {}", other),
        )),
    }
}

fn required_int(fields: &Map<String, Value>, key: &str, path: &str) -> Result<i64, MappingError> {
    optional_int(fields, key, path)?.ok_or_else(|| MappingError::missing(path))
}

/// Integers arrive either as JSON numbers or, in image metadata, as strings.
fn optional_int(
    fields: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<i64>, MappingError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| MappingError::invalid(path, format!("not an integer: {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| MappingError::invalid(path, format!("not an integer: {:?}", s))),
        Some(other) => Err(MappingError::invalid(
            path,
            format!("expected an integer, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::{ResourceRef, ServerAddress};
    use crate::test_support::instance_update_payload as notification;
    use chrono::TimeZone;
    use instance_indexer_shared::{FieldType, InstanceSchema};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn resource() -> ServerResource {
        ServerResource {
            id: Some("i1".to_string()),
            name: Some("vm1".to_string()),
            status: Some("ACTIVE".to_string()),
            tenant_id: Some("t1".to_string()),
            created: Some("2024-01-01T00:00:00".to_string()),
            updated: Some("2024-01-02T00:00:00".to_string()),
            flavor: Some(ResourceRef::new("f1")),
            image: Some(ResourceRef::new("im1")),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_from_resource_end_to_end() {
        let doc = from_resource(&resource()).unwrap();

        assert_eq!(doc.id, "i1");
        assert_eq!(doc.instance_id, "i1");
        assert_eq!(doc.name, "vm1");
        assert_eq!(doc.status, "active");
        assert_eq!(doc.owner, "t1");
        assert_eq!(doc.flavor, Some(FlavorRef::new("f1")));
        assert_eq!(doc.image, Some(ImageRef::new("im1")));
        assert_eq!(
            doc.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            doc.updated,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert!(doc.vcpus.is_none());
    }

    #[test]
    fn test_from_resource_missing_required() {
        for field in ["id", "name", "status", "tenant_id"] {
            let mut r = resource();
            match field {
                "id" => r.id = None,
                "name" => r.name = None,
                "status" => r.status = None,
                _ => r.tenant_id = None,
            }
            assert_eq!(from_resource(&r), Err(MappingError::missing(field)));
        }
    }

    #[test]
    fn test_from_resource_networks_ipv4_only() {
        let mut r = resource();
        r.addresses = BTreeMap::from([(
            "private".to_string(),
            vec![
                ServerAddress {
                    addr: "10.0.0.3".to_string(),
                    version: Some(4),
                },
                ServerAddress {
                    addr: "fd00::3".to_string(),
                    version: Some(6),
                },
                ServerAddress {
                    addr: "10.0.0.4".to_string(),
                    version: None,
                },
            ],
        )]);

        let doc = from_resource(&r).unwrap();

        let ips: Vec<_> = doc.networks.iter().map(|n| n.ipv4.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.3", "10.0.0.4"]);
        assert!(doc.networks.iter().all(|n| n.name == "private"));
    }

    #[test]
    fn test_from_resource_rfc3339_and_invalid_timestamps() {
        let mut r = resource();
        r.created = Some("2024-01-01T01:00:00+01:00".to_string());
        let doc = from_resource(&r).unwrap();
        assert_eq!(
            doc.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        r.updated = Some("yesterday".to_string());
        assert!(matches!(
            from_resource(&r),
            Err(MappingError::InvalidField { ref field, .. }) if field == "updated"
        ));
    }

    #[test]
    fn test_from_resource_without_image() {
        let mut r = resource();
        r.image = None;
        r.availability_zone = Some("az1".to_string());

        let doc = from_resource(&r).unwrap();
        assert!(doc.image.is_none());
        assert_eq!(doc.availability_zone.as_deref(), Some("az1"));
    }

    #[test]
    fn test_from_notification() {
        let doc = from_notification(&notification(), now()).unwrap();

        assert_eq!(doc.id, "i1");
        assert_eq!(doc.instance_id, "i1");
        assert_eq!(doc.name, "vm1");
        assert_eq!(doc.owner, "t1");
        assert_eq!(doc.updated, Some(now()));
        assert_eq!(
            doc.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let image = doc.image.unwrap();
        assert_eq!(image.id, "im1");
        assert_eq!(image.min_disk, Some(20));
        assert_eq!(image.min_ram, Some(0));
        assert_eq!(image.disk_format.as_deref(), Some("qcow2"));

        let flavor = doc.flavor.unwrap();
        assert_eq!(flavor.id, "f1");
        assert_eq!(flavor.name.as_deref(), Some("m1.small"));

        assert_eq!(doc.vcpus, Some(1));
        assert_eq!(doc.memory_mb, Some(2048));
        assert!(doc.networks.is_empty());
    }

    #[test]
    fn test_from_notification_keeps_state_case() {
        let mut payload = notification();
        payload["state"] = json!("BUILDING");

        let doc = from_notification(&payload, now()).unwrap();
        assert_eq!(doc.status, "BUILDING");
    }

    #[test]
    fn test_from_notification_created_at_with_fraction_and_offset() {
        let mut payload = notification();
        payload["created_at"] = json!("2024-01-01 00:00:00.000000");
        assert!(from_notification(&payload, now()).is_ok());

        payload["created_at"] = json!("2024-01-01 00:00:00+00:00");
        let doc = from_notification(&payload, now()).unwrap();
        assert_eq!(
            doc.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_from_notification_missing_required() {
        for field in [
            "instance_id",
            "display_name",
            "state",
            "tenant_id",
            "created_at",
            "image_meta",
        ] {
            let mut payload = notification();
            payload.as_object_mut().unwrap().remove(field);

            assert_eq!(
                from_notification(&payload, now()),
                Err(MappingError::missing(field))
            );
        }
    }

    #[test]
    fn test_from_notification_missing_image_meta_subfield() {
        for field in [
            "base_image_ref",
            "kernel_id",
            "container_format",
            "disk_format",
            "min_disk",
            "min_ram",
        ] {
            let mut payload = notification();
            payload["image_meta"].as_object_mut().unwrap().remove(field);

            assert_eq!(
                from_notification(&payload, now()),
                Err(MappingError::missing(format!("image_meta.{}", field)))
            );
        }
    }

    #[test]
    fn test_from_notification_optional_fields_absent() {
        let mut payload = notification();
        let fields = payload.as_object_mut().unwrap();
        for key in [
            "availability_zone",
            "instance_flavor_id",
            "instance_type",
            "state_description",
            "vcpus",
            "disk_gb",
            "memory_mb",
        ] {
            fields.remove(key);
        }

        let doc = from_notification(&payload, now()).unwrap();
        assert!(doc.flavor.is_none());
        assert!(doc.vcpus.is_none());
    }

    #[test]
    fn test_from_notification_instance_type_without_flavor_id() {
        let mut payload = notification();
        payload.as_object_mut().unwrap().remove("instance_flavor_id");

        let doc = from_notification(&payload, now()).unwrap();

        assert_eq!(payload["instance_type"], "m1.small");
        assert!(doc.flavor.is_none());
    }

    #[test]
    fn test_from_notification_rejects_non_object() {
        assert!(matches!(
            from_notification(&json!("nope"), now()),
            Err(MappingError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_from_notification_idempotent_except_updated() {
        let payload = notification();
        let first = from_notification(&payload, now()).unwrap();
        let mut second = from_notification(&payload, now() + chrono::Duration::seconds(5)).unwrap();

        assert_ne!(first.updated, second.updated);
        second.updated = first.updated;
        assert_eq!(first, second);
    }

    #[test]
    fn test_delete_target() {
        assert_eq!(delete_target(&json!({ "instance_id": "i1" })).unwrap(), "i1");
        assert_eq!(
            delete_target(&json!({})),
            Err(MappingError::missing("instance_id"))
        );
    }

    /// Collect dotted paths of every field present in a serialized document.
    fn emitted_paths(value: &Value, prefix: &str, out: &mut Vec<String>) {
        let Some(object) = value.as_object() else {
            return;
        };
        for (key, child) in object {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match child {
                Value::Object(_) => emitted_paths(child, &path, out),
                Value::Array(items) => {
                    for item in items {
                        emitted_paths(item, &path, out);
                    }
                }
                _ => {}
            }
            out.push(path);
        }
    }

    #[test]
    fn test_schema_covers_every_emitted_field() {
        let mut r = resource();
        r.availability_zone = Some("az1".to_string());
        r.addresses = BTreeMap::from([(
            "private".to_string(),
            vec![ServerAddress {
                addr: "10.0.0.3".to_string(),
                version: Some(4),
            }],
        )]);

        let docs = vec![
            from_resource(&r).unwrap(),
            from_notification(&notification(), now()).unwrap(),
        ];

        let schema = InstanceSchema;
        for doc in docs {
            let mut paths = Vec::new();
            emitted_paths(&serde_json::to_value(&doc).unwrap(), "", &mut paths);
            for path in paths {
                assert!(schema.field(&path).is_some(), "unmapped field {}", path);
            }
        }
        assert!(matches!(
            schema.field("networks").unwrap().field_type,
            FieldType::Nested(_)
        ));
    }
}
