//! External registry batch provider.
//!
//! Turns an arbitrary list of identifiers into rate-limited, chunked
//! registry requests. Per-chunk failures are logged and skipped so a caller
//! always gets whatever could be resolved; only an unrelenting registry
//! throttle escapes as an error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tideye_core::{Clock, Mmsi, RegistryConfig, RegistryError, TideyeResult, VesselRecord};
use tideye_sources::{ExternalRegistry, RegistryOutcome};
use tideye_storage::CacheStore;

use crate::blocklist::InvalidIdentifiers;
use crate::rate_limiter::RateLimiter;

pub struct BatchProvider {
    registry: Arc<dyn ExternalRegistry>,
    store: Arc<dyn CacheStore>,
    limiter: Arc<RateLimiter>,
    blocklist: Arc<InvalidIdentifiers>,
    clock: Arc<dyn Clock>,
    max_per_request: usize,
    max_throttle_restarts: u32,
}

/// What to do after handling one chunk's response.
enum ChunkStep {
    Next,
    Restart,
}

impl BatchProvider {
    pub fn new(
        registry: Arc<dyn ExternalRegistry>,
        store: Arc<dyn CacheStore>,
        limiter: Arc<RateLimiter>,
        blocklist: Arc<InvalidIdentifiers>,
        clock: Arc<dyn Clock>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            limiter,
            blocklist,
            clock,
            max_per_request: config.max_per_request.max(1),
            max_throttle_restarts: config.max_throttle_restarts,
        }
    }

    /// Keep well-formed, non-blocklisted identifiers, first occurrence only.
    async fn admissible(&self, identifiers: &[String]) -> TideyeResult<Vec<Mmsi>> {
        let blocked = self.blocklist.snapshot().await?;
        let mut seen = HashSet::new();
        let mut admitted = Vec::with_capacity(identifiers.len());

        for raw in identifiers {
            let mmsi = match Mmsi::parse(raw) {
                Ok(mmsi) => mmsi,
                Err(e) => {
                    tracing::warn!(identifier = %raw, error = %e, "Dropping malformed identifier");
                    continue;
                }
            };
            if blocked.contains(mmsi.as_str()) {
                tracing::debug!(%mmsi, "Skipping blocklisted identifier");
                continue;
            }
            if seen.insert(mmsi.clone()) {
                admitted.push(mmsi);
            }
        }
        Ok(admitted)
    }

    /// Resolve `identifiers` through the registry.
    ///
    /// Chunks of at most `max_per_request` identifiers are sent one at a
    /// time, each behind the rate limiter, with a full interval between
    /// chunks. A throttle response sleeps one interval and restarts the
    /// pending list from the top; an invalid-identifier response blocklists
    /// that identifier and restarts without it. Records already resolved are
    /// kept across restarts.
    pub async fn resolve_batch(
        &self,
        identifiers: &[String],
    ) -> TideyeResult<HashMap<Mmsi, VesselRecord>> {
        let mut pending = self.admissible(identifiers).await?;
        let mut results: HashMap<Mmsi, VesselRecord> = HashMap::new();
        let mut throttle_restarts = 0u32;

        'restart: loop {
            pending.retain(|mmsi| !results.contains_key(mmsi));
            if pending.is_empty() {
                return Ok(results);
            }

            let chunks: Vec<Vec<Mmsi>> = pending
                .chunks(self.max_per_request)
                .map(<[Mmsi]>::to_vec)
                .collect();
            let chunk_count = chunks.len();

            for (index, chunk) in chunks.iter().enumerate() {
                match self.dispatch(chunk, index, chunk_count, &mut results).await? {
                    RegistryOutcome::Records => {}
                    RegistryOutcome::Throttled => {
                        throttle_restarts += 1;
                        if throttle_restarts > self.max_throttle_restarts {
                            tracing::error!(
                                restarts = self.max_throttle_restarts,
                                "Registry still throttling, giving up"
                            );
                            return Err(RegistryError::ThrottleRetriesExhausted {
                                attempts: self.max_throttle_restarts,
                            }
                            .into());
                        }
                        tracing::warn!(
                            restart = throttle_restarts,
                            "Registry throttled request, restarting batch"
                        );
                        tokio::time::sleep(self.limiter.interval()).await;
                        continue 'restart;
                    }
                    RegistryOutcome::InvalidIdentifier(id) => {
                        match self.reject_identifier(&id, &mut pending).await? {
                            ChunkStep::Restart => continue 'restart,
                            ChunkStep::Next => {}
                        }
                    }
                    RegistryOutcome::Failed(message) => {
                        tracing::warn!(
                            chunk = index + 1,
                            chunks = chunk_count,
                            error = %message,
                            "Registry chunk failed, continuing"
                        );
                    }
                }

                if chunk_count > 1 && index + 1 < chunk_count {
                    tokio::time::sleep(self.limiter.interval()).await;
                }
            }

            return Ok(results);
        }
    }

    /// Send one chunk and fold its records into `results`.
    ///
    /// Transport errors are reported as [`RegistryOutcome::Failed`]. Only
    /// rate-limit bookkeeping failures propagate.
    async fn dispatch(
        &self,
        chunk: &[Mmsi],
        index: usize,
        chunk_count: usize,
        results: &mut HashMap<Mmsi, VesselRecord>,
    ) -> TideyeResult<RegistryOutcome> {
        let permit = self.limiter.acquire().await?;
        tracing::info!(
            chunk = index + 1,
            chunks = chunk_count,
            size = chunk.len(),
            "Calling registry"
        );
        let response = self.registry.fetch(chunk).await;
        permit.record(self.clock.now()).await?;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(RegistryOutcome::Failed(e.to_string())),
        };

        let outcome = response.outcome();
        if outcome == RegistryOutcome::Records {
            let requested: HashSet<&Mmsi> = chunk.iter().collect();
            for record in response.records(self.clock.now()) {
                if !requested.contains(&record.mmsi) {
                    tracing::debug!(mmsi = %record.mmsi, "Ignoring unrequested registry entry");
                    continue;
                }
                if let Err(e) = self.store.vessel_upsert(&record).await {
                    tracing::warn!(mmsi = %record.mmsi, error = %e, "Failed to cache registry record");
                }
                results.insert(record.mmsi.clone(), record);
            }
        }
        Ok(outcome)
    }

    async fn reject_identifier(&self, id: &str, pending: &mut Vec<Mmsi>) -> TideyeResult<ChunkStep> {
        let before = pending.len();
        pending.retain(|mmsi| mmsi.as_str() != id);
        if pending.len() == before {
            tracing::warn!(mmsi = id, "Registry rejected an identifier that was not requested");
            return Ok(ChunkStep::Next);
        }
        self.blocklist.add(id).await?;
        tracing::warn!(
            mmsi = id,
            remaining = pending.len(),
            "Registry rejected identifier, restarting without it"
        );
        Ok(ChunkStep::Restart)
    }
}

impl std::fmt::Debug for BatchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProvider")
            .field("max_per_request", &self.max_per_request)
            .field("max_throttle_restarts", &self.max_throttle_restarts)
            .field("limiter", &self.limiter)
            .finish()
    }
}
