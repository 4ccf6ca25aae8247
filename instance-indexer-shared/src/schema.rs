//! Schema descriptor for the instance index.
//!
//! Describes field names and their semantic types independently of any
//! particular search backend. The repository crate renders this into the
//! backend's mapping format when the index is created.

/// Name of the index holding instance documents.
pub const INDEX_NAME: &str = "nova";

/// Kind of document stored for each instance.
pub const DOCUMENT_KIND: &str = "instance";

/// Semantic type of an indexed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Analyzed, full-text string.
    Text,
    /// Exact-match string.
    Keyword,
    Integer,
    Date,
    /// IP address.
    Ip,
    /// Nested object with its own fields.
    Nested(Vec<FieldMapping>),
}

/// A single field entry in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: &'static str,
    pub field_type: FieldType,
}

impl FieldMapping {
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type }
    }

    /// Whether the field participates in full-text analysis.
    pub fn is_analyzed(&self) -> bool {
        matches!(self.field_type, FieldType::Text)
    }

    /// Child fields for nested objects, empty otherwise.
    pub fn children(&self) -> &[FieldMapping] {
        match &self.field_type {
            FieldType::Nested(children) => children,
            _ => &[],
        }
    }
}

/// Schema descriptor for compute instance documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceSchema;

impl InstanceSchema {
    pub fn index_name(&self) -> &'static str {
        INDEX_NAME
    }

    pub fn document_kind(&self) -> &'static str {
        DOCUMENT_KIND
    }

    /// All top-level fields of the instance document.
    ///
    /// The schema may declare fields no mapper populates yet (`image.image_id`,
    /// top-level `disk_format`); the reverse must never happen.
    pub fn fields(&self) -> Vec<FieldMapping> {
        use FieldType::*;

        vec![
            FieldMapping::new("id", Keyword),
            FieldMapping::new("instance_id", Keyword),
            FieldMapping::new("doc_kind", Keyword),
            FieldMapping::new("name", Text),
            FieldMapping::new(
                "flavor",
                Nested(vec![
                    FieldMapping::new("id", Keyword),
                    FieldMapping::new("name", Keyword),
                ]),
            ),
            FieldMapping::new("owner", Keyword),
            FieldMapping::new("created", Date),
            FieldMapping::new("updated", Date),
            FieldMapping::new(
                "networks",
                Nested(vec![
                    FieldMapping::new("name", Text),
                    FieldMapping::new("ipv4", Ip),
                ]),
            ),
            FieldMapping::new(
                "image",
                Nested(vec![
                    FieldMapping::new("id", Keyword),
                    FieldMapping::new("container_format", Keyword),
                    FieldMapping::new("min_ram", Integer),
                    FieldMapping::new("disk_format", Keyword),
                    FieldMapping::new("min_disk", Integer),
                    FieldMapping::new("kernel_id", Keyword),
                    FieldMapping::new("image_id", Keyword),
                ]),
            ),
            FieldMapping::new("state_description", Text),
            FieldMapping::new("availability_zone", Keyword),
            FieldMapping::new("status", Keyword),
            FieldMapping::new("disk_format", Keyword),
            FieldMapping::new("memory_mb", Integer),
            FieldMapping::new("vcpus", Integer),
            FieldMapping::new("disk_gb", Integer),
        ]
    }

    /// Look up a field by dotted path, e.g. `"image.min_ram"`.
    pub fn field(&self, path: &str) -> Option<FieldMapping> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields().into_iter().find(|f| f.name == first)?;

        for part in parts {
            current = current
                .children()
                .iter()
                .find(|f| f.name == part)
                .cloned()?;
        }

        Some(current)
    }
}
