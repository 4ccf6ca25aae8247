//! Configuration and dependency wiring for the instance indexer.

mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::IndexerConfig;
