//! OpenSearch query builders.
//!
//! This module renders declarative [`FilterExpr`] trees into the OpenSearch
//! query DSL and builds the read and scan queries used by the client.

use serde_json::{json, Value};

use instance_indexer_shared::FilterExpr;

/// Render a filter expression as an OpenSearch filter clause.
pub fn render_filter(filter: &FilterExpr) -> Value {
    match filter {
        FilterExpr::Term { field, value } => json!({ "term": { field: value } }),
        FilterExpr::Terms { field, values } => json!({ "terms": { field: values } }),
        // Documents without the field count as older than any instant
        FilterExpr::Before { field, instant } => json!({
            "bool": {
                "should": [
                    { "range": { field: { "lt": instant.to_rfc3339() } } },
                    { "bool": { "must_not": [{ "exists": { "field": field } }] } }
                ],
                "minimum_should_match": 1
            }
        }),
        FilterExpr::And(parts) => {
            let clauses: Vec<Value> = parts.iter().map(render_filter).collect();
            json!({ "bool": { "filter": clauses } })
        }
    }
}

/// Build a filtered read query.
///
/// The filter runs in filter context (no scoring). Free text, when given,
/// goes into `must` and cannot widen the filter.
pub fn build_filtered_query(filter: &FilterExpr, text: Option<&str>, size: usize) -> Value {
    let must: Vec<Value> = match text.map(str::trim) {
        Some(text) if !text.is_empty() => vec![json!({
            "multi_match": {
                "query": text,
                "fields": ["name^2", "state_description"],
                "fuzziness": "AUTO"
            }
        })],
        _ => vec![json!({ "match_all": {} })],
    };

    json!({
        "size": size,
        "query": {
            "bool": {
                "must": must,
                "filter": [render_filter(filter)]
            }
        }
    })
}

/// Build one page of an id scan over documents matching `filter`.
///
/// Pages are ordered by `id` and continued with `search_after`.
pub fn build_id_scan_query(
    filter: &FilterExpr,
    page_size: usize,
    search_after: Option<&str>,
) -> Value {
    let mut query = json!({
        "size": page_size,
        "_source": false,
        "query": {
            "bool": {
                "filter": [render_filter(filter)]
            }
        },
        "sort": [{ "id": "asc" }]
    });

    if let Some(after) = search_after {
        query["search_after"] = json!([after]);
    }

    query
}
