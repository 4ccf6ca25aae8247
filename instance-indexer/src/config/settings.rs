//! Indexer settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::IndexingError;
use instance_indexer_pipeline::consumer::{
    notification_topic_name, NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY,
};
use instance_indexer_pipeline::enumerator::{ComputeClientConfig, ComputeCredentials};
use instance_indexer_pipeline::loader::LoaderConfig;
use instance_indexer_pipeline::resync::ResyncConfig;
use instance_indexer_repository::IndexConfig;
use instance_indexer_shared::INDEX_NAME;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "instance-indexer";

/// Everything the indexer needs to start, read once at startup.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub opensearch_url: String,
    pub index: IndexConfig,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub notification_topic: String,
    pub compute: ComputeCredentials,
    pub compute_client: ComputeClientConfig,
    pub resync: ResyncConfig,
}

impl IndexerConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_NAME`: index to write to (default: nova)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: instance-indexer)
    /// - `NOTIFICATION_TOPIC`: topic with compute notifications (default: notifications.nova)
    /// - `COMPUTE_API_URL`: compute API base URL (required)
    /// - `COMPUTE_AUTH_TOKEN`: pre-issued compute API token (required)
    /// - `COMPUTE_ALL_TENANTS`: list every tenant's servers (default: true)
    /// - `COMPUTE_PAGE_SIZE`: servers per listing page (default: 1000)
    /// - `COMPUTE_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `RESYNC_SWEEP`: delete documents of vanished instances on resync (default: true)
    /// - `LOADER_BATCH_SIZE`: documents per bulk request (default: 500)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| IndexingError::config(format!("{} is not set", key)));

        let compute_defaults = ComputeClientConfig::default();
        let loader_defaults = LoaderConfig::default();
        let resync_defaults = ResyncConfig::default();

        Ok(Self {
            opensearch_url: get("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            index: IndexConfig::new(get("INDEX_NAME").unwrap_or_else(|| INDEX_NAME.to_string())),
            kafka_broker: get("KAFKA_BROKER").unwrap_or_else(|| DEFAULT_KAFKA_BROKER.to_string()),
            kafka_group_id: get("KAFKA_GROUP_ID")
                .unwrap_or_else(|| DEFAULT_KAFKA_GROUP_ID.to_string()),
            notification_topic: get("NOTIFICATION_TOPIC").unwrap_or_else(|| {
                notification_topic_name(NOTIFICATION_EXCHANGE, NOTIFICATION_ROUTING_KEY)
            }),
            compute: ComputeCredentials {
                endpoint: require("COMPUTE_API_URL")?,
                auth_token: require("COMPUTE_AUTH_TOKEN")?,
            },
            compute_client: ComputeClientConfig {
                page_size: parse_or(&get, "COMPUTE_PAGE_SIZE", compute_defaults.page_size)?,
                all_tenants: parse_flag_or(&get, "COMPUTE_ALL_TENANTS", compute_defaults.all_tenants)?,
                timeout: Duration::from_secs(parse_or(
                    &get,
                    "COMPUTE_TIMEOUT_SECS",
                    compute_defaults.timeout.as_secs(),
                )?),
            },
            resync: ResyncConfig {
                sweep: parse_flag_or(&get, "RESYNC_SWEEP", resync_defaults.sweep)?,
                loader: LoaderConfig {
                    batch_size: parse_or(&get, "LOADER_BATCH_SIZE", loader_defaults.batch_size)?,
                    ..loader_defaults
                },
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, IndexingError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

fn parse_flag_or<G>(get: &G, key: &str, default: bool) -> Result<bool, IndexingError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(IndexingError::config(format!(
            "Invalid value for {}: {}",
            key, v
        ))),
    }
}
