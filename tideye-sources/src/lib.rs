//! Tideye Sources - Source Adapter Layer
//!
//! Provider-agnostic traits for the three upstream sources the resolver
//! consults, plus concrete adapters:
//!
//! - [`TimeSeriesSource`]: Flux queries against the telemetry store (InfluxDB)
//! - [`LiveVesselSource`]: per-vessel lookups against a live feed (Signal K)
//! - [`ExternalRegistry`]: batched lookups against the rationed registry (AISHub)
//!
//! Adapters report failures as [`SourceError`]s; the retry and rate-limit
//! policies live above this crate.

use std::collections::HashMap;

use async_trait::async_trait;
use tideye_core::{Mmsi, SourceError, TideyeError, TideyeResult, VesselRecord};

pub mod providers;
pub mod registry;
pub mod telemetry;

pub use providers::{AisHubRegistry, InfluxSource, SignalKSource};
pub use registry::{RegistryMetadata, RegistryOutcome, RegistryResponse};
pub use telemetry::{
    position_query, position_samples, vessel_contexts_query, vessel_identifiers, QueryOptions,
    TelemetryQueryClient,
};

/// One row of a time-series query result, keyed by column name.
pub type TelemetryRow = HashMap<String, String>;

// ============================================================================
// SOURCE TRAITS
// ============================================================================

/// Executes Flux queries against a time-series store.
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    /// Run a query and collect every result row.
    async fn collect_rows(&self, flux: &str) -> TideyeResult<Vec<TelemetryRow>>;

    /// Short name used in errors and logs.
    fn name(&self) -> &str {
        "timeseries"
    }
}

/// Looks up a single vessel in a live feed.
#[async_trait]
pub trait LiveVesselSource: Send + Sync {
    /// Fetch the current view of a vessel.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - The feed knows the vessel (the record may be unnamed)
    /// * `Ok(None)` - The feed has never seen it
    /// * `Err(TideyeError::Source)` - Transport or payload failure
    async fn get_vessel(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>>;
}

/// Batched lookup against the external vessel registry.
///
/// Implementations send exactly one upstream request per call and never
/// retry; throttling and invalid-identifier handling belong to the caller.
#[async_trait]
pub trait ExternalRegistry: Send + Sync {
    async fn fetch(&self, identifiers: &[Mmsi]) -> TideyeResult<RegistryResponse>;
}

// ============================================================================
// ERROR HELPERS
// ============================================================================

pub(crate) fn request_failed(source: &str, status: u16, message: impl Into<String>) -> TideyeError {
    SourceError::RequestFailed {
        source_name: source.to_string(),
        status,
        message: message.into(),
    }
    .into()
}

pub(crate) fn invalid_response(source: &str, reason: impl Into<String>) -> TideyeError {
    SourceError::InvalidResponse {
        source_name: source.to_string(),
        reason: reason.into(),
    }
    .into()
}

pub(crate) fn timed_out(source: &str, after: std::time::Duration) -> TideyeError {
    SourceError::Timeout {
        source_name: source.to_string(),
        after_ms: after.as_millis() as u64,
    }
    .into()
}

/// Strip trailing slashes so paths can be appended with `format!`.
pub(crate) fn trim_base_url(url: impl Into<String>) -> String {
    let url = url.into();
    url.trim_end_matches('/').to_string()
}
