//! AISHub web service client

use crate::registry::RegistryResponse;
use crate::{invalid_response, request_failed, ExternalRegistry};
use async_trait::async_trait;
use reqwest::Client;
use tideye_core::{ConfigError, Mmsi, RegistryConfig, TideyeResult};

const SOURCE: &str = "aishub";

/// Client for the AISHub vessel data web service.
///
/// Sends one request per [`ExternalRegistry::fetch`] call. Spacing calls,
/// chunking and reacting to `ERROR_MESSAGE` are the caller's job.
pub struct AisHubRegistry {
    client: Client,
    base_url: String,
    username: String,
}

impl AisHubRegistry {
    /// Create a new AISHub client.
    ///
    /// # Arguments
    /// * `base_url` - Web service endpoint, normally `https://data.aishub.net/ws.php`
    /// * `username` - AISHub account username
    pub fn new(base_url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            username: username.into(),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> TideyeResult<Self> {
        let username = config
            .username
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "AISHUB_USERNAME".to_string(),
            })?;
        Ok(Self::new(config.base_url.clone(), username))
    }

    fn query_params(&self, identifiers: &[Mmsi]) -> [(&'static str, String); 4] {
        let joined = identifiers
            .iter()
            .map(Mmsi::as_str)
            .collect::<Vec<_>>()
            .join(",");
        [
            ("username", self.username.clone()),
            ("format", "1".to_string()),
            ("output", "json".to_string()),
            ("mmsi", joined),
        ]
    }
}

#[async_trait]
impl ExternalRegistry for AisHubRegistry {
    async fn fetch(&self, identifiers: &[Mmsi]) -> TideyeResult<RegistryResponse> {
        tracing::debug!(count = identifiers.len(), "Requesting vessels from AISHub");

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(identifiers))
            .send()
            .await
            .map_err(|e| request_failed(SOURCE, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| invalid_response(SOURCE, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(request_failed(SOURCE, status.as_u16(), body));
        }

        RegistryResponse::parse(&body)
    }
}

impl std::fmt::Debug for AisHubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AisHubRegistry")
            .field("base_url", &self.base_url)
            .field("username", &"[REDACTED]")
            .finish()
    }
}
