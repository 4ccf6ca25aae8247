//! HTTP client for the compute service's server listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tracing::{debug, info, instrument};
use url::Url;

use crate::enumerator::resource::{ServerPage, ServerResource};
use crate::enumerator::InstanceSource;
use crate::errors::TransportError;

/// Header carrying the pre-issued compute API token.
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Credentials for the compute API, supplied by the caller.
///
/// Token issuance happens outside this crate.
#[derive(Clone)]
pub struct ComputeCredentials {
    /// Compute API base URL, e.g. `http://compute:8774/v2.1`.
    pub endpoint: String,
    pub auth_token: String,
}

impl std::fmt::Debug for ComputeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeCredentials")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Listing options for the compute client.
#[derive(Debug, Clone)]
pub struct ComputeClientConfig {
    /// Servers requested per page (`limit`).
    pub page_size: usize,
    /// List servers of every tenant (requires an admin token).
    pub all_tenants: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ComputeClientConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            all_tenants: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Compute API client used by the bulk enumerator.
pub struct ComputeClient {
    http: reqwest::Client,
    credentials: ComputeCredentials,
    config: ComputeClientConfig,
}

impl ComputeClient {
    /// Create a new compute client.
    ///
    /// # Returns
    ///
    /// * `Ok(ComputeClient)` - A new client instance
    /// * `Err(TransportError)` - If the endpoint is not a URL or the HTTP client cannot be built
    pub fn new(
        credentials: ComputeCredentials,
        config: ComputeClientConfig,
    ) -> Result<Self, TransportError> {
        Url::parse(&credentials.endpoint)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", credentials.endpoint, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        info!(
            endpoint = %credentials.endpoint,
            page_size = config.page_size,
            all_tenants = config.all_tenants,
            "Created compute API client"
        );

        Ok(Self {
            http,
            credentials,
            config,
        })
    }

    /// Build the URL of a listing page starting after `marker`.
    fn page_url(&self, marker: Option<&str>) -> Result<Url, TransportError> {
        let base = format!(
            "{}/servers/detail",
            self.credentials.endpoint.trim_end_matches('/')
        );
        let mut url = Url::parse(&base).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.config.page_size.to_string());
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
            if self.config.all_tenants {
                query.append_pair("all_tenants", "1");
            }
        }

        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<ServerPage, TransportError> {
        debug!(url = %url, "Fetching server page");

        let response = self
            .http
            .get(url)
            .header(AUTH_TOKEN_HEADER, &self.credentials.auth_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ServerPage>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl InstanceSource for ComputeClient {
    /// List every server visible to the configured token.
    ///
    /// Follows the API's paging: while a page advertises a `next` link the
    /// following page is requested with `marker` set to the last server id.
    /// No retries; the caller owns retry policy.
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<ServerResource>, TransportError> {
        let mut servers = Vec::new();
        let mut url = self.page_url(None)?;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(url).await?;
            pages += 1;

            let has_next = page.has_next();
            let last_id = page.servers.last().and_then(|s| s.id.clone());
            let count = page.servers.len();
            servers.extend(page.servers);

            match last_id {
                Some(marker) if has_next && count > 0 => {
                    url = self.page_url(Some(&marker))?;
                }
                _ => break,
            }
        }

        info!(count = servers.len(), pages = pages, "Listed compute instances");
        Ok(servers)
    }

    fn lists_all_tenants(&self) -> bool {
        self.config.all_tenants
    }
}
