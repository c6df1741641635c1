//! Tiered identity resolution: cache, then live source, then registry.

use std::collections::HashMap;
use std::sync::Arc;

use tideye_core::{
    sort_newest_first, Clock, Mmsi, TideyeConfig, TideyeResult, TimeWindow, Timestamp,
    VesselRecord,
};
use tideye_sources::{
    vessel_contexts_query, vessel_identifiers, ExternalRegistry, LiveVesselSource, QueryOptions,
    TelemetryQueryClient, TimeSeriesSource,
};
use tideye_storage::CacheStore;

use crate::batch::BatchProvider;
use crate::blocklist::InvalidIdentifiers;
use crate::positions::PositionRecorder;
use crate::rate_limiter::RateLimiter;

/// The external collaborators a resolver talks to.
#[derive(Clone)]
pub struct Sources {
    pub telemetry: Arc<dyn TimeSeriesSource>,
    pub live: Arc<dyn LiveVesselSource>,
    pub registry: Arc<dyn ExternalRegistry>,
}

/// Resolves vessel identifiers to display names.
///
/// Each tier is consulted only for identifiers the previous tiers could not
/// name. Whatever a tier learns is written back to the cache store, so the
/// next resolution of the same vessel stops at the first tier.
pub struct IdentityResolver {
    store: Arc<dyn CacheStore>,
    live: Arc<dyn LiveVesselSource>,
    clock: Arc<dyn Clock>,
    telemetry: TelemetryQueryClient,
    limiter: Arc<RateLimiter>,
    blocklist: Arc<InvalidIdentifiers>,
    batch: BatchProvider,
    positions: PositionRecorder,
    bucket: String,
    max_window: chrono::Duration,
    default_window: chrono::Duration,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn CacheStore>,
        sources: Sources,
        clock: Arc<dyn Clock>,
        config: &TideyeConfig,
    ) -> Self {
        let telemetry =
            TelemetryQueryClient::new(sources.telemetry, QueryOptions::from(&config.telemetry));
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            clock.clone(),
            config.registry.rate_limit_interval,
        ));
        let blocklist = Arc::new(InvalidIdentifiers::new(store.clone()));
        let batch = BatchProvider::new(
            sources.registry,
            store.clone(),
            limiter.clone(),
            blocklist.clone(),
            clock.clone(),
            &config.registry,
        );
        let positions = PositionRecorder::new(
            telemetry.clone(),
            store.clone(),
            clock.clone(),
            config.telemetry.bucket.clone(),
            config.resolver.default_window,
        );

        Self {
            store,
            live: sources.live,
            clock,
            telemetry,
            limiter,
            blocklist,
            batch,
            positions,
            bucket: config.telemetry.bucket.clone(),
            max_window: config.resolver.max_window,
            default_window: config.resolver.default_window,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn invalid_identifiers(&self) -> &InvalidIdentifiers {
        &self.blocklist
    }

    pub fn position_recorder(&self) -> &PositionRecorder {
        &self.positions
    }

    /// Validate optional window bounds. `end` defaults to now and `start`
    /// to the default window before `end`.
    pub fn window(
        &self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> TideyeResult<TimeWindow> {
        Ok(TimeWindow::from_bounds(
            start,
            end,
            self.clock.now(),
            self.default_window,
            self.max_window,
        )?)
    }

    /// Names of vessels observed between `start` and `end`, newest first.
    pub async fn resolve_names(
        &self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> TideyeResult<Vec<VesselRecord>> {
        let window = self.window(start, end)?;
        self.resolve_window(&window).await
    }

    /// Resolve every vessel seen in `window`.
    ///
    /// Telemetry failures propagate once the query client's retries are
    /// spent. Live and registry failures only shrink the result.
    pub async fn resolve_window(&self, window: &TimeWindow) -> TideyeResult<Vec<VesselRecord>> {
        let mut resolved: HashMap<Mmsi, VesselRecord> = HashMap::new();

        // Tier 1: cache
        for record in self
            .store
            .vessel_list_by_observed_range(window.start(), window.end())
            .await?
        {
            resolved.insert(record.mmsi.clone(), record);
        }
        tracing::debug!(cached = resolved.len(), "Seeded resolution from cache");

        let rows = self
            .telemetry
            .query(&vessel_contexts_query(&self.bucket, window))
            .await?;
        let observed = vessel_identifiers(&rows);
        let uncached: Vec<Mmsi> = observed
            .into_iter()
            .filter(|mmsi| !resolved.contains_key(mmsi))
            .collect();
        tracing::info!(
            cached = resolved.len(),
            uncached = uncached.len(),
            "Resolving vessel names"
        );

        // Tier 2: live source
        let mut missing = Vec::new();
        for mmsi in uncached {
            match self.live_record(&mmsi).await {
                Some(record) => {
                    resolved.insert(mmsi, record);
                }
                None => missing.push(mmsi),
            }
        }

        // Tier 3: registry, only when a call would not have to wait
        if !missing.is_empty() {
            for (mmsi, record) in self.registry_records(&missing).await? {
                resolved.entry(mmsi).or_insert(record);
            }
        }

        let mut records: Vec<VesselRecord> = resolved.into_values().collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Look one identifier up in the live source, caching a named result.
    ///
    /// Lookup and cache failures are logged, never returned.
    async fn live_record(&self, mmsi: &Mmsi) -> Option<VesselRecord> {
        let record = match self.live.get_vessel(mmsi).await {
            Ok(Some(record)) if record.is_named() => record,
            Ok(_) => {
                tracing::debug!(%mmsi, "Live source has no name");
                return None;
            }
            Err(e) => {
                tracing::warn!(%mmsi, error = %e, "Live lookup failed");
                return None;
            }
        };

        if let Err(e) = self.store.vessel_upsert(&record).await {
            tracing::warn!(%mmsi, error = %e, "Failed to cache live record");
        }
        Some(record)
    }

    /// Registry tier for `missing`, skipped entirely while rate limited.
    async fn registry_records(
        &self,
        missing: &[Mmsi],
    ) -> TideyeResult<HashMap<Mmsi, VesselRecord>> {
        let status = self.limiter.status().await?;
        if !status.can_call {
            tracing::info!(
                missing = missing.len(),
                next_call_in_secs = status.next_call_in_secs,
                "Skipping registry tier, rate limited"
            );
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = missing.iter().map(|m| m.as_str().to_string()).collect();
        match self.batch.resolve_batch(&ids).await {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(error = %e, "Registry tier failed, returning partial result");
                Ok(HashMap::new())
            }
        }
    }

    /// Resolve a single identifier: cache, then live source, then registry.
    ///
    /// Returns `Ok(None)` when no tier could name the vessel. Malformed
    /// identifiers are rejected.
    pub async fn resolve_name(&self, id: &str) -> TideyeResult<Option<VesselRecord>> {
        let mmsi = Mmsi::parse(id)?;

        if let Some(record) = self.store.vessel_get(&mmsi).await? {
            if record.is_named() {
                tracing::debug!(%mmsi, "Cache hit");
                return Ok(Some(record));
            }
        }

        if let Some(record) = self.live_record(&mmsi).await {
            return Ok(Some(record));
        }

        let mut found = self.registry_records(std::slice::from_ref(&mmsi)).await?;
        Ok(found.remove(&mmsi))
    }

    /// Query the live source directly and refresh the cache entry.
    ///
    /// Unlike the resolution tiers, failures propagate. The returned record
    /// is the stored one after merging, so it keeps a previously known name
    /// when the live document has none.
    pub async fn lookup_live(&self, id: &str) -> TideyeResult<Option<VesselRecord>> {
        let mmsi = Mmsi::parse(id)?;
        let Some(record) = self.live.get_vessel(&mmsi).await? else {
            return Ok(None);
        };
        self.store.vessel_upsert(&record).await?;
        self.store.vessel_get(&mmsi).await
    }

    /// Resolve identifiers through the registry alone, newest first.
    ///
    /// This waits for the rate limiter instead of skipping.
    pub async fn lookup_batch(&self, identifiers: &[String]) -> TideyeResult<Vec<VesselRecord>> {
        let mut records: Vec<VesselRecord> = self
            .batch
            .resolve_batch(identifiers)
            .await?
            .into_values()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("bucket", &self.bucket)
            .field("telemetry", &self.telemetry)
            .field("batch", &self.batch)
            .field("max_window", &self.max_window)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
