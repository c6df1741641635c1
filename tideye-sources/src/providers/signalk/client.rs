//! Signal K HTTP client

use std::sync::Arc;

use super::types::VesselDocument;
use crate::{invalid_response, request_failed, trim_base_url, LiveVesselSource};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tideye_core::{
    Clock, LiveSourceConfig, Mmsi, Position, SystemClock, TideyeResult, Timestamp, VesselRecord,
};

const SOURCE: &str = "signalk";

/// Live vessel lookups over the Signal K REST API.
pub struct SignalKSource {
    client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl SignalKSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_clock(base_url, Arc::new(SystemClock::new()))
    }

    /// Use `clock` to stamp observations instead of the system clock.
    pub fn with_clock(base_url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Client::new(),
            base_url: trim_base_url(base_url),
            clock,
        }
    }

    pub fn from_config(config: &LiveSourceConfig) -> TideyeResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| tideye_core::ConfigError::MissingRequired {
                field: "SIGNALK_URL".to_string(),
            })?;
        Ok(Self::new(url))
    }

    fn vessel_url(&self, mmsi: &Mmsi) -> String {
        format!(
            "{}/signalk/v1/api/vessels/urn:mrn:imo:mmsi:{}",
            self.base_url, mmsi
        )
    }
}

/// Build a record from a Signal K vessel document, observed at `now`.
pub fn document_record(mmsi: &Mmsi, document: Value, now: Timestamp) -> TideyeResult<VesselRecord> {
    let parsed: VesselDocument = serde_json::from_value(document.clone())
        .map_err(|e| invalid_response(SOURCE, format!("Bad vessel document: {}", e)))?;

    let position = parsed
        .lat_lon()
        .and_then(|p| Position::new(p.latitude, p.longitude));

    let mut record = VesselRecord::new(mmsi.clone(), now)
        .with_position(position)
        .with_metadata(document);
    if let Some(name) = parsed.name {
        record = record.with_name(name);
    }
    Ok(record)
}

#[async_trait]
impl LiveVesselSource for SignalKSource {
    async fn get_vessel(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>> {
        let response = self
            .client
            .get(self.vessel_url(mmsi))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| request_failed(SOURCE, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(%mmsi, "Vessel not known to Signal K");
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(request_failed(SOURCE, status.as_u16(), error_text));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| invalid_response(SOURCE, format!("Failed to parse response: {}", e)))?;

        document_record(mmsi, document, self.clock.now()).map(Some)
    }
}

impl std::fmt::Debug for SignalKSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalKSource")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn mmsi() -> Mmsi {
        Mmsi::parse("319139200").unwrap()
    }

    #[test]
    fn test_vessel_url() {
        let source = SignalKSource::new("http://signalk.local:3000/");
        assert_eq!(
            source.vessel_url(&mmsi()),
            "http://signalk.local:3000/signalk/v1/api/vessels/urn:mrn:imo:mmsi:319139200"
        );
    }

    #[test]
    fn test_document_record_with_name_and_position() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let document = json!({
            "name": "Example",
            "mmsi": "319139200",
            "navigation": {
                "position": {
                    "value": {"latitude": 43.7, "longitude": 7.42},
                    "timestamp": "2024-06-01T11:59:58.000Z"
                }
            }
        });

        let record = document_record(&mmsi(), document.clone(), now).unwrap();
        assert_eq!(record.name.as_deref(), Some("Example"));
        assert_eq!(record.last_seen, now);
        assert_eq!(record.position, Position::new(43.7, 7.42));
        assert_eq!(record.metadata, Some(document));
    }

    #[test]
    fn test_document_record_without_name() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let record = document_record(&mmsi(), json!({"mmsi": "319139200"}), now).unwrap();
        assert!(!record.is_named());
        assert!(record.position.is_none());
    }

    #[test]
    fn test_document_record_rejects_wrong_shape() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(document_record(&mmsi(), json!({"name": 42}), now).is_err());
    }
}
