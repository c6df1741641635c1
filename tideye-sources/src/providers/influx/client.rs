//! InfluxDB HTTP query client

use super::csv_rows::parse_rows;
use super::types::{ApiError, QueryParams};
use crate::{invalid_response, request_failed, trim_base_url, TelemetryRow, TimeSeriesSource};
use async_trait::async_trait;
use reqwest::Client;
use tideye_core::{TelemetryConfig, TideyeResult};

const SOURCE: &str = "influxdb";

/// InfluxDB v2 query API client.
pub struct InfluxSource {
    client: Client,
    base_url: String,
    token: String,
    org: String,
}

impl InfluxSource {
    /// Create a new InfluxDB client.
    ///
    /// # Arguments
    /// * `base_url` - Server URL, e.g. `http://localhost:8086`
    /// * `token` - API token with read access to the bucket
    /// * `org` - Organisation ID the bucket belongs to
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: trim_base_url(base_url),
            token: token.into(),
            org: org.into(),
        }
    }

    /// Build a client from configuration. Fails when URL, token or org is missing.
    pub fn from_config(config: &TelemetryConfig) -> TideyeResult<Self> {
        let missing = |field: &str| tideye_core::ConfigError::MissingRequired {
            field: field.to_string(),
        };
        let url = config.url.as_deref().ok_or_else(|| missing("INFLUXDB_URL"))?;
        let token = config.token.as_deref().ok_or_else(|| missing("INFLUXDB_TOKEN"))?;
        let org = config.org.as_deref().ok_or_else(|| missing("INFLUXDB_ORG_ID"))?;
        Ok(Self::new(url, token, org))
    }

    fn query_url(&self) -> String {
        format!("{}/api/v2/query", self.base_url)
    }
}

#[async_trait]
impl TimeSeriesSource for InfluxSource {
    async fn collect_rows(&self, flux: &str) -> TideyeResult<Vec<TelemetryRow>> {
        let response = self
            .client
            .post(self.query_url())
            .query(&QueryParams { org: &self.org })
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(flux.to_string())
            .send()
            .await
            .map_err(|e| request_failed(SOURCE, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| invalid_response(SOURCE, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(api_error) => format!("{}: {}", api_error.code, api_error.message),
                Err(_) => body,
            };
            return Err(request_failed(SOURCE, status.as_u16(), message));
        }

        parse_rows(&body)
    }

    fn name(&self) -> &str {
        SOURCE
    }
}

impl std::fmt::Debug for InfluxSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSource")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
