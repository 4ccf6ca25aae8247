//! # Instance Indexer Pipeline
//!
//! This crate keeps a search index of compute instances in sync with the
//! compute service.
//!
//! ## Architecture
//!
//! Two write paths converge on the same [`InstanceDocument`] shape and the
//! same index sink:
//!
//! 1. **Consumer**: Receives compute notifications from Kafka
//! 2. **Processor**: Maps payloads to documents and routes each event
//! 3. **Enumerator**: Lists every instance from the compute API
//! 4. **Loader**: Batches documents into the index
//! 5. **Resync**: Runs the enumerator through the loader and sweeps stale documents
//! 6. **Orchestrator**: Drives the event path
//!
//! [`InstancePlugin`] ties them together behind one surface.
//!
//! [`InstanceDocument`]: instance_indexer_shared::InstanceDocument

pub mod consumer;
pub mod enumerator;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod plugin;
pub mod processor;
pub mod resync;

#[cfg(test)]
mod test_support;

pub use errors::{HandlingError, MappingError, PipelineError, TransportError};
pub use plugin::InstancePlugin;
