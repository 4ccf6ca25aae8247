//! # Instance Indexer Shared
//!
//! Types shared by every crate of the compute instance indexer:
//!
//! - [`InstanceDocument`]: the canonical, index-ready representation of one instance
//! - [`InstanceSchema`]: the backend-neutral field mapping for that document
//! - [`FilterExpr`]: declarative read-time filters, including the access filter

pub mod document;
pub mod filter;
pub mod schema;

pub use document::{FlavorRef, ImageRef, InstanceDocument, NetworkAttachment};
pub use filter::{access_filter, FilterExpr};
pub use schema::{FieldMapping, FieldType, InstanceSchema, DOCUMENT_KIND, INDEX_NAME};
