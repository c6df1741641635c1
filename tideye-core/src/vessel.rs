//! Vessel records and position history

use crate::identity::{Mmsi, Timestamp};
use serde::{Deserialize, Serialize};

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Build a position, rejecting coordinates outside the WGS84 ranges.
    ///
    /// AIS encodes "not available" as latitude 91 / longitude 181, which this
    /// filters out as well.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let in_range = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        in_range.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Last-known identity of a vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselRecord {
    pub mmsi: Mmsi,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub last_seen: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Source-specific payload, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl VesselRecord {
    pub fn new(mmsi: Mmsi, last_seen: Timestamp) -> Self {
        Self {
            mmsi,
            name: None,
            last_seen,
            position: None,
            metadata: None,
        }
    }

    /// Set the display name. Blank names are treated as absent.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = normalize_name(name.into());
        self
    }

    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// A record is only worth returning when it carries a name.
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Fold `self` (the newer observation) over a stored record.
    ///
    /// Name, timestamp and metadata come from the newer observation; a missing
    /// name or position falls back to what was already stored.
    pub fn merged_over(self, stored: &VesselRecord) -> VesselRecord {
        VesselRecord {
            mmsi: self.mmsi,
            name: self.name.or_else(|| stored.name.clone()),
            last_seen: self.last_seen,
            position: self.position.or(stored.position),
            metadata: self.metadata.or_else(|| stored.metadata.clone()),
        }
    }
}

/// Trim a vessel name, mapping empty strings to `None`.
pub fn normalize_name(name: String) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == name.len() {
        Some(name)
    } else {
        Some(trimmed.to_string())
    }
}

/// One observed position of a vessel. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub mmsi: Mmsi,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: Timestamp,
}

/// Sort records newest-first by last-observed timestamp.
pub fn sort_newest_first(records: &mut [VesselRecord]) {
    records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
}
