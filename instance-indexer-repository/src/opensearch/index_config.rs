//! OpenSearch index configuration and mappings.
//!
//! Renders the backend-neutral [`InstanceSchema`] into OpenSearch index
//! settings and mappings.

use serde_json::{json, Map, Value};

use crate::config::IndexConfig;
use instance_indexer_shared::{FieldMapping, FieldType, InstanceSchema};

/// Get the index settings and mappings for the instance index.
///
/// The mapping keeps `dynamic: true` so fields added to documents before the
/// schema catches up are still indexed.
pub fn index_settings(config: &IndexConfig, schema: &InstanceSchema) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas
        },
        "mappings": {
            "dynamic": true,
            "properties": properties(&schema.fields())
        }
    })
}

fn properties(fields: &[FieldMapping]) -> Value {
    let mut props = Map::new();
    for field in fields {
        props.insert(field.name.to_string(), field_mapping(field));
    }
    Value::Object(props)
}

fn field_mapping(field: &FieldMapping) -> Value {
    match &field.field_type {
        FieldType::Text => json!({ "type": "text" }),
        FieldType::Keyword => json!({ "type": "keyword" }),
        FieldType::Integer => json!({ "type": "integer" }),
        FieldType::Date => json!({ "type": "date" }),
        FieldType::Ip => json!({ "type": "ip" }),
        FieldType::Nested(children) => json!({
            "type": "nested",
            "properties": properties(children)
        }),
    }
}
