//! Bulk enumerator for the catch-up path.
//!
//! Lists every instance from the compute service so the index can be seeded
//! or repaired.

mod client;
mod resource;

use async_trait::async_trait;

use crate::errors::TransportError;

pub use client::{ComputeClient, ComputeClientConfig, ComputeCredentials};
pub use resource::{PageLink, ResourceRef, ServerAddress, ServerPage, ServerResource};

/// Source of the complete, current set of instances.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// Return every instance visible to the configured credentials.
    ///
    /// Fails with a `TransportError` if the service is unreachable or answers
    /// with a non-success status. Implementations do not retry.
    async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError>;

    /// Whether `list_all` covers every tenant or only the caller's own.
    ///
    /// The catch-up sweep only considers owners it has seen in the listing
    /// when this is false.
    fn lists_all_tenants(&self) -> bool;
}
