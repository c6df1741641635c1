//! External registry wire format.
//!
//! The registry answers every request with a JSON array. The first element
//! is always a metadata object; the second, when present, is the list of
//! vessel entries:
//!
//! ```text
//! [{"ERROR": false, "USERNAME": "..", "FORMAT": "HUMAN", "RECORDS": 1},
//!  [{"MMSI": 319139200, "NAME": "EXAMPLE", "TIME": "2024-06-01 12:00:00 GMT", ...}]]
//! ```
//!
//! Error responses carry `ERROR: true` and an `ERROR_MESSAGE`, and may omit
//! the entry list entirely.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tideye_core::{Mmsi, Position, TideyeResult, Timestamp, VesselRecord};

use crate::invalid_response;

static INVALID_MMSI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Invalid MMSI "([0-9]+)""#).expect("Invalid registry error regex"));

const THROTTLE_MESSAGE: &str = "Too frequent";

/// Metadata element of a registry response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RegistryMetadata {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub records: Option<u64>,
}

/// How the batch provider should treat a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOutcome {
    /// No error; entries (possibly none) are usable.
    Records,
    /// The registry's own rate limit rejected the call.
    Throttled,
    /// The registry rejected one identifier of the request.
    InvalidIdentifier(String),
    /// Any other registry-side error.
    Failed(String),
}

/// A parsed registry response.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryResponse {
    pub metadata: RegistryMetadata,
    /// Raw entries, kept verbatim so they can be stored as record metadata.
    pub entries: Vec<Value>,
}

impl RegistryResponse {
    /// Successful response carrying `entries`.
    pub fn with_entries(entries: Vec<Value>) -> Self {
        Self {
            metadata: RegistryMetadata {
                error: false,
                error_message: None,
                records: Some(entries.len() as u64),
            },
            entries,
        }
    }

    /// Error response with no entries.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            metadata: RegistryMetadata {
                error: true,
                error_message: Some(message.into()),
                records: None,
            },
            entries: Vec::new(),
        }
    }

    /// Parse a raw response body.
    pub fn parse(body: &str) -> TideyeResult<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| invalid_response("aishub", format!("Failed to parse response: {}", e)))?;
        Self::from_value(value)
    }

    /// Parse an already-decoded response body.
    pub fn from_value(value: Value) -> TideyeResult<Self> {
        let Value::Array(mut parts) = value else {
            return Err(invalid_response("aishub", "response is not a JSON array"));
        };
        if parts.is_empty() {
            return Err(invalid_response("aishub", "response array is empty"));
        }

        let entries = if parts.len() > 1 {
            match parts.swap_remove(1) {
                Value::Array(entries) => entries,
                Value::Null => Vec::new(),
                other => {
                    return Err(invalid_response(
                        "aishub",
                        format!("entry list is not an array: {}", other),
                    ))
                }
            }
        } else {
            Vec::new()
        };

        let metadata: RegistryMetadata = serde_json::from_value(parts.swap_remove(0))
            .map_err(|e| invalid_response("aishub", format!("Bad metadata: {}", e)))?;

        Ok(Self { metadata, entries })
    }

    /// Classify the response.
    pub fn outcome(&self) -> RegistryOutcome {
        if !self.metadata.error {
            return RegistryOutcome::Records;
        }
        let message = self.metadata.error_message.clone().unwrap_or_default();
        if message.contains(THROTTLE_MESSAGE) {
            return RegistryOutcome::Throttled;
        }
        if let Some(captures) = INVALID_MMSI_PATTERN.captures(&message) {
            return RegistryOutcome::InvalidIdentifier(captures[1].to_string());
        }
        RegistryOutcome::Failed(message)
    }

    /// Named vessel records from the entry list.
    ///
    /// Entries without an identifier or a non-blank name are dropped. `now`
    /// stands in for a missing or unparseable `TIME`.
    pub fn records(&self, now: Timestamp) -> Vec<VesselRecord> {
        self.entries
            .iter()
            .filter_map(|entry| entry_record(entry, now))
            .collect()
    }
}

fn entry_record(entry: &Value, now: Timestamp) -> Option<VesselRecord> {
    let mmsi = match entry.get("MMSI")? {
        Value::String(s) => Mmsi::parse(s).ok()?,
        Value::Number(n) => Mmsi::parse(format!("{:09}", n.as_u64()?)).ok()?,
        _ => return None,
    };
    let name = entry.get("NAME")?.as_str()?;

    let last_seen = entry
        .get("TIME")
        .and_then(Value::as_str)
        .and_then(parse_registry_time)
        .unwrap_or(now);

    let latitude = entry.get("LATITUDE").and_then(Value::as_f64);
    let longitude = entry.get("LONGITUDE").and_then(Value::as_f64);
    let position = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Position::new(lat, lon),
        _ => None,
    };

    let record = VesselRecord::new(mmsi, last_seen)
        .with_name(name)
        .with_position(position)
        .with_metadata(entry.clone());
    record.is_named().then_some(record)
}

/// Registry timestamps look like `2024-06-01 12:00:00 GMT`; RFC 3339 is
/// accepted as well.
fn parse_registry_time(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S GMT") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
