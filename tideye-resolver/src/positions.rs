//! Position history capture from telemetry.

use std::sync::Arc;

use chrono::Duration;
use tideye_core::{Clock, PositionSample, TideyeResult, TimeWindow};
use tideye_sources::{position_query, position_samples, TelemetryQueryClient};
use tideye_storage::CacheStore;

/// Copies observed positions from telemetry into the cache store.
pub struct PositionRecorder {
    telemetry: TelemetryQueryClient,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    bucket: String,
    default_window: Duration,
}

impl PositionRecorder {
    pub fn new(
        telemetry: TelemetryQueryClient,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        bucket: impl Into<String>,
        default_window: Duration,
    ) -> Self {
        Self {
            telemetry,
            store,
            clock,
            bucket: bucket.into(),
            default_window,
        }
    }

    /// Query positions in `window` (default: trailing window ending now) and
    /// append one sample per returned row.
    pub async fn record_positions(
        &self,
        window: Option<TimeWindow>,
    ) -> TideyeResult<Vec<PositionSample>> {
        let window =
            window.unwrap_or_else(|| TimeWindow::trailing(self.clock.now(), self.default_window));

        let rows = self
            .telemetry
            .query(&position_query(&self.bucket, &window))
            .await?;
        let samples = position_samples(&rows);

        for sample in &samples {
            self.store.position_append(sample).await?;
        }

        tracing::info!(
            rows = rows.len(),
            samples = samples.len(),
            start = %window.start(),
            end = %window.end(),
            "Recorded vessel positions"
        );
        Ok(samples)
    }
}

impl std::fmt::Debug for PositionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionRecorder")
            .field("bucket", &self.bucket)
            .field("default_window", &self.default_window)
            .finish()
    }
}
