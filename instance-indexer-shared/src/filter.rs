//! Declarative read-time filters.
//!
//! Filters are data, not predicates: the search engine evaluates them. The
//! repository crate renders a [`FilterExpr`] into the engine's query DSL.

use chrono::{DateTime, Utc};

use crate::schema::DOCUMENT_KIND;

/// A filter expression evaluated by the search engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Exact match of a keyword field.
    Term { field: String, value: String },
    /// Exact match of a keyword field against any of `values`.
    Terms { field: String, values: Vec<String> },
    /// Date field strictly before `instant`, or absent.
    Before { field: String, instant: DateTime<Utc> },
    /// Conjunction of all sub-expressions.
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn before(field: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self::Before {
            field: field.into(),
            instant,
        }
    }
}

/// Build the access filter for a caller.
///
/// Restricts reads to instance documents owned by `owner`. This is the only
/// access-control boundary for index reads and every query must carry it.
pub fn access_filter(owner: &str) -> FilterExpr {
    FilterExpr::And(vec![
        FilterExpr::term("owner", owner),
        FilterExpr::term("doc_kind", DOCUMENT_KIND),
    ])
}
