//! Tideye Test Utilities
//!
//! Shared test infrastructure for the Tideye workspace:
//! - A wall clock driven by tokio's (pausable) timer
//! - Scripted fakes for every source trait
//! - Proptest generators for identifiers and records
//! - Fixtures and custom assertions

pub use tideye_storage::{CacheStore, InMemoryCacheStore, SettingsExt};

pub use tideye_core::{
    Clock, InputError, Mmsi, Position, PositionSample, RegistryError, SourceError, TideyeConfig,
    TideyeError, TideyeResult, TimeWindow, Timestamp, VesselRecord,
};
pub use tideye_sources::{
    ExternalRegistry, LiveVesselSource, RegistryResponse, TelemetryRow, TimeSeriesSource,
};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// CLOCK
// ============================================================================

/// Wall clock that advances with tokio's timer.
///
/// Under `#[tokio::test(start_paused = true)]` the returned time only moves
/// when the runtime auto-advances or `tokio::time::advance` is called, so
/// persisted timestamps and sleeps stay consistent.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor: Timestamp,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Start at `anchor`. Must be called inside a tokio runtime.
    pub fn starting_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.started.elapsed();
        self.anchor + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

// ============================================================================
// FAKE SOURCES
// ============================================================================

/// Scripted [`TimeSeriesSource`].
///
/// Queued results are returned in order; once the queue is empty every
/// query returns the default rows.
#[derive(Debug, Default)]
pub struct FakeTimeSeries {
    default_rows: Mutex<Vec<TelemetryRow>>,
    queued: Mutex<VecDeque<TideyeResult<Vec<TelemetryRow>>>>,
    queries: Mutex<Vec<String>>,
}

impl FakeTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `identifiers` as the vessels seen in any window.
    pub fn with_contexts(identifiers: &[&str]) -> Self {
        let fake = Self::new();
        *lock(&fake.default_rows) = identifiers.iter().map(|id| context_row(id)).collect();
        fake
    }

    pub fn with_rows(rows: Vec<TelemetryRow>) -> Self {
        let fake = Self::new();
        *lock(&fake.default_rows) = rows;
        fake
    }

    /// Queue a result for the next query.
    pub fn push_result(&self, result: TideyeResult<Vec<TelemetryRow>>) {
        lock(&self.queued).push_back(result);
    }

    /// Every Flux query received, in order.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.queries).len()
    }
}

#[async_trait]
impl TimeSeriesSource for FakeTimeSeries {
    async fn collect_rows(&self, flux: &str) -> TideyeResult<Vec<TelemetryRow>> {
        lock(&self.queries).push(flux.to_string());
        if let Some(result) = lock(&self.queued).pop_front() {
            return result;
        }
        Ok(lock(&self.default_rows).clone())
    }

    fn name(&self) -> &str {
        "fake-timeseries"
    }
}

/// Scripted [`LiveVesselSource`] backed by a map of known vessels.
#[derive(Debug, Default)]
pub struct FakeLiveSource {
    vessels: Mutex<HashMap<Mmsi, VesselRecord>>,
    failing: Mutex<HashSet<Mmsi>>,
    lookups: Mutex<Vec<Mmsi>>,
}

impl FakeLiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vessel(self, record: VesselRecord) -> Self {
        lock(&self.vessels).insert(record.mmsi.clone(), record);
        self
    }

    /// Make lookups for `mmsi` fail with a transport error.
    pub fn failing_for(self, mmsi: &str) -> Self {
        lock(&self.failing).insert(fixtures::mmsi(mmsi));
        self
    }

    /// Every identifier looked up, in order.
    pub fn lookups(&self) -> Vec<Mmsi> {
        lock(&self.lookups).clone()
    }
}

#[async_trait]
impl LiveVesselSource for FakeLiveSource {
    async fn get_vessel(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>> {
        lock(&self.lookups).push(mmsi.clone());
        if lock(&self.failing).contains(mmsi) {
            return Err(SourceError::RequestFailed {
                source_name: "fake-live".to_string(),
                status: 503,
                message: "unavailable".to_string(),
            }
            .into());
        }
        Ok(lock(&self.vessels).get(mmsi).cloned())
    }
}

/// Scripted [`ExternalRegistry`].
///
/// Queued responses are consumed first. With an empty queue the fake answers
/// like the real registry would: one entry per requested identifier present
/// in its directory.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    directory: Mutex<HashMap<Mmsi, Value>>,
    queued: Mutex<VecDeque<TideyeResult<RegistryResponse>>>,
    requests: Mutex<Vec<Vec<Mmsi>>>,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vessel the registry knows by name.
    pub fn with_vessel(self, mmsi: &str, name: &str) -> Self {
        lock(&self.directory).insert(fixtures::mmsi(mmsi), fixtures::registry_entry(mmsi, name));
        self
    }

    pub fn push_response(&self, response: RegistryResponse) {
        lock(&self.queued).push_back(Ok(response));
    }

    pub fn push_error(&self, error: TideyeError) {
        lock(&self.queued).push_back(Err(error));
    }

    /// Identifier lists of every request, in order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        lock(&self.requests)
            .iter()
            .map(|ids| ids.iter().map(|id| id.as_str().to_string()).collect())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Tokio instants at which requests arrived.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        lock(&self.call_times).clone()
    }
}

#[async_trait]
impl ExternalRegistry for FakeRegistry {
    async fn fetch(&self, identifiers: &[Mmsi]) -> TideyeResult<RegistryResponse> {
        lock(&self.requests).push(identifiers.to_vec());
        lock(&self.call_times).push(tokio::time::Instant::now());

        if let Some(result) = lock(&self.queued).pop_front() {
            return result;
        }
        let directory = lock(&self.directory);
        let entries = identifiers
            .iter()
            .filter_map(|id| directory.get(id).cloned())
            .collect();
        Ok(RegistryResponse::with_entries(entries))
    }
}

/// A telemetry row carrying only a vessel context.
pub fn context_row(mmsi: &str) -> TelemetryRow {
    let mut row = TelemetryRow::new();
    row.insert("context".to_string(), format!("vessels.urn:mrn:imo:mmsi:{}", mmsi));
    row.insert("_time".to_string(), "2024-06-01T12:00:00Z".to_string());
    row
}

/// A pivoted position row.
pub fn position_row(mmsi: &str, lat: f64, lon: f64, at: Timestamp) -> TelemetryRow {
    let mut row = context_row(mmsi);
    row.insert("_time".to_string(), at.to_rfc3339());
    row.insert("lat".to_string(), lat.to_string());
    row.insert("lon".to_string(), lon.to_string());
    row
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tideye types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid identifier.
    pub fn arb_mmsi() -> impl Strategy<Value = Mmsi> {
        "[0-9]{9}".prop_map(|s| fixtures::mmsi(&s))
    }

    /// Generate a string that is never a valid identifier.
    pub fn arb_malformed_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9]{0,8}",
            "[0-9]{10,12}",
            "[0-9]{4}[a-zA-Z -][0-9]{4}",
            "[A-Z]{9}",
        ]
    }

    /// Generate a mix of valid and malformed identifier strings.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => arb_mmsi().prop_map(String::from),
            1 => arb_malformed_identifier(),
        ]
    }

    /// Generate a non-blank vessel name.
    pub fn arb_vessel_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9 ]{0,18}[A-Z0-9]"
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a named record, with or without a position.
    pub fn arb_vessel_record() -> impl Strategy<Value = VesselRecord> {
        (
            arb_mmsi(),
            arb_vessel_name(),
            arb_timestamp(),
            prop::option::of((-90.0f64..=90.0, -180.0f64..=180.0)),
        )
            .prop_map(|(mmsi, name, at, position)| {
                VesselRecord::new(mmsi, at)
                    .with_name(name)
                    .with_position(position.and_then(|(lat, lon)| Position::new(lat, lon)))
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common scenarios.

    use super::*;
    use std::time::Duration;

    /// Fixed reference time: 2024-06-01T12:00:00Z.
    pub fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Parse an identifier, panicking on malformed input.
    #[track_caller]
    pub fn mmsi(value: &str) -> Mmsi {
        match Mmsi::parse(value) {
            Ok(mmsi) => mmsi,
            Err(e) => panic!("fixture identifier {value:?} is invalid: {e}"),
        }
    }

    /// A named record observed at `at`.
    #[track_caller]
    pub fn named_record(id: &str, name: &str, at: Timestamp) -> VesselRecord {
        VesselRecord::new(mmsi(id), at).with_name(name)
    }

    /// A registry entry as the web service returns it.
    pub fn registry_entry(id: &str, name: &str) -> Value {
        json!({
            "MMSI": id,
            "NAME": name,
            "TIME": "2024-06-01 11:30:00 GMT",
            "LATITUDE": 43.7,
            "LONGITUDE": 7.42,
        })
    }

    /// Configuration with production intervals and no credentials.
    pub fn test_config() -> TideyeConfig {
        let mut config = TideyeConfig::default();
        config.registry.username = Some("AH_TEST".to_string());
        config.telemetry.timeout = Duration::from_secs(30);
        config
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tideye-specific results.

    use super::*;

    /// Assert that a result is an input error.
    #[track_caller]
    pub fn assert_input_error<T: std::fmt::Debug>(result: &TideyeResult<T>) {
        match result {
            Err(TideyeError::Input(_)) => {}
            other => panic!("Expected Input error, got: {:?}", other),
        }
    }

    /// Assert that a result is a source timeout.
    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &TideyeResult<T>) {
        match result {
            Err(TideyeError::Source(SourceError::Timeout { .. })) => {}
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
    }

    /// Assert that records are ordered newest first.
    #[track_caller]
    pub fn assert_newest_first(records: &[VesselRecord]) {
        for pair in records.windows(2) {
            assert!(
                pair[0].last_seen >= pair[1].last_seen,
                "{} ({}) listed before newer {} ({})",
                pair[0].mmsi,
                pair[0].last_seen,
                pair[1].mmsi,
                pair[1].last_seen
            );
        }
    }

    /// Assert that no request carried a malformed or blocklisted identifier.
    #[track_caller]
    pub fn assert_requests_exclude(requests: &[Vec<String>], excluded: &[&str]) {
        for request in requests {
            for id in request {
                assert!(Mmsi::is_valid(id), "malformed identifier {id:?} sent upstream");
                assert!(!excluded.contains(&id.as_str()), "excluded identifier {id} sent upstream");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
