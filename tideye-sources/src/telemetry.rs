//! Telemetry query client with bounded retries, plus the Flux queries the
//! resolver issues and the row conversions for their results.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tideye_core::constants::{DEFAULT_TELEMETRY_MAX_RETRIES, DEFAULT_TELEMETRY_TIMEOUT};
use tideye_core::{Mmsi, PositionSample, TelemetryConfig, TideyeResult, TimeWindow};

use crate::{timed_out, TelemetryRow, TimeSeriesSource};

/// Per-query retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Race each attempt against this timeout.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_retries: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TELEMETRY_TIMEOUT,
            max_retries: DEFAULT_TELEMETRY_MAX_RETRIES,
        }
    }
}

impl From<&TelemetryConfig> for QueryOptions {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }
}

/// Backoff before the attempt following failed attempt `attempt` (1-based).
fn backoff_after(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16))
}

/// Wraps a [`TimeSeriesSource`] with timeouts and exponential backoff.
#[derive(Clone)]
pub struct TelemetryQueryClient {
    source: Arc<dyn TimeSeriesSource>,
    options: QueryOptions,
}

impl TelemetryQueryClient {
    pub fn new(source: Arc<dyn TimeSeriesSource>, options: QueryOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// Run a query with the client's default options.
    pub async fn query(&self, flux: &str) -> TideyeResult<Vec<TelemetryRow>> {
        self.query_with(flux, self.options).await
    }

    /// Run a query, retrying failed or timed-out attempts.
    ///
    /// After failed attempt `n` the client sleeps `2^n` seconds before the
    /// next one. The final failure is returned without sleeping.
    pub async fn query_with(
        &self,
        flux: &str,
        options: QueryOptions,
    ) -> TideyeResult<Vec<TelemetryRow>> {
        let max_attempts = options.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            let result = match tokio::time::timeout(options.timeout, self.source.collect_rows(flux))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(timed_out(self.source.name(), options.timeout)),
            };

            match result {
                Ok(rows) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        rows = rows.len(),
                        "Telemetry query succeeded"
                    );
                    return Ok(rows);
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        source = self.source.name(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Telemetry query attempt failed"
                    );
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(backoff_after(attempt)).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for TelemetryQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryQueryClient")
            .field("source", &self.source.name())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// FLUX QUERIES
// ============================================================================

fn flux_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn flux_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Distinct vessel contexts that reported a position within the window.
pub fn vessel_contexts_query(bucket: &str, window: &TimeWindow) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {start}, stop: {stop})
  |> filter(fn: (r) => r["_measurement"] == "navigation.position")
  |> group(columns: ["context"])
  |> last()
  |> keep(columns: ["_time", "context"])
  |> yield(name: "vessels")"#,
        bucket = flux_string(bucket),
        start = flux_time(window.start()),
        stop = flux_time(window.end()),
    )
}

/// Latitude/longitude pairs within the window, pivoted into one row per fix.
pub fn position_query(bucket: &str, window: &TimeWindow) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {start}, stop: {stop})
  |> filter(fn: (r) => r["_measurement"] == "navigation.position")
  |> filter(fn: (r) => r["_field"] == "lat" or r["_field"] == "lon")
  |> pivot(rowKey: ["_time", "context"], columnKey: ["_field"], valueColumn: "_value")
  |> yield(name: "positions")"#,
        bucket = flux_string(bucket),
        start = flux_time(window.start()),
        stop = flux_time(window.end()),
    )
}

// ============================================================================
// ROW CONVERSIONS
// ============================================================================

/// Distinct identifiers from `context` columns, in first-seen order.
///
/// Contexts whose last segment is not a valid MMSI (the own vessel's UUID
/// context, aircraft, AtoNs) are skipped.
pub fn vessel_identifiers(rows: &[TelemetryRow]) -> Vec<Mmsi> {
    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();
    for row in rows {
        let Some(context) = row.get("context") else {
            continue;
        };
        match Mmsi::from_context(context) {
            Ok(mmsi) => {
                if seen.insert(mmsi.clone()) {
                    identifiers.push(mmsi);
                }
            }
            Err(_) => tracing::debug!(%context, "Skipping non-MMSI telemetry context"),
        }
    }
    identifiers
}

/// Convert pivoted position rows into samples. Incomplete rows are skipped.
pub fn position_samples(rows: &[TelemetryRow]) -> Vec<PositionSample> {
    rows.iter().filter_map(position_sample).collect()
}

fn position_sample(row: &TelemetryRow) -> Option<PositionSample> {
    let mmsi = Mmsi::from_context(row.get("context")?).ok()?;
    let latitude = row.get("lat")?.trim().parse::<f64>().ok()?;
    let longitude = row.get("lon")?.trim().parse::<f64>().ok()?;
    let observed_at = DateTime::parse_from_rfc3339(row.get("_time")?.trim())
        .ok()?
        .with_timezone(&Utc);
    Some(PositionSample {
        mmsi,
        latitude,
        longitude,
        observed_at,
    })
}
