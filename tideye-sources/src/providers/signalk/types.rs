//! Signal K REST API response types
//!
//! Only the fields the resolver reads are modelled; the full document is
//! kept as record metadata.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VesselDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mmsi: Option<String>,
    #[serde(default)]
    pub navigation: Option<Navigation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Navigation {
    #[serde(default)]
    pub position: Option<PositionEntry>,
}

/// A Signal K value wrapper: `{"value": {...}, "timestamp": "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionEntry {
    #[serde(default)]
    pub value: Option<LatLon>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl VesselDocument {
    pub fn lat_lon(&self) -> Option<LatLon> {
        self.navigation.as_ref()?.position.as_ref()?.value
    }
}
