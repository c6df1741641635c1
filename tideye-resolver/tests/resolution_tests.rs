//! End-to-end resolution scenarios over scripted sources.
//!
//! Every test runs on a paused tokio clock: sleeps complete instantly and
//! [`TokioClock`] keeps persisted timestamps in step with them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tideye_core::constants::{INVALID_MMSI_KEY, LAST_CALL_KEY};
use tideye_resolver::{IdentityResolver, Sources};
use tideye_sources::RegistryResponse;
use tideye_storage::LmdbCacheStore;
use tideye_test_utils::assertions::{assert_newest_first, assert_requests_exclude, assert_timeout};
use tideye_test_utils::fixtures::{mmsi, named_record, t0, test_config};
use tideye_test_utils::{
    CacheStore, FakeLiveSource, FakeRegistry, FakeTimeSeries, InMemoryCacheStore, SettingsExt,
    TideyeConfig, TokioClock,
};

const MINUTE: Duration = Duration::from_secs(60);

// ============================================================================
// HARNESS
// ============================================================================

struct Pipeline {
    store: InMemoryCacheStore,
    telemetry: Arc<FakeTimeSeries>,
    live: Arc<FakeLiveSource>,
    registry: Arc<FakeRegistry>,
    resolver: IdentityResolver,
}

fn pipeline(telemetry: FakeTimeSeries, live: FakeLiveSource, registry: FakeRegistry) -> Pipeline {
    pipeline_with(telemetry, live, registry, test_config())
}

fn pipeline_with(
    telemetry: FakeTimeSeries,
    live: FakeLiveSource,
    registry: FakeRegistry,
    config: TideyeConfig,
) -> Pipeline {
    let store = InMemoryCacheStore::new();
    let telemetry = Arc::new(telemetry);
    let live = Arc::new(live);
    let registry = Arc::new(registry);
    let resolver = IdentityResolver::new(
        Arc::new(store.clone()),
        Sources {
            telemetry: telemetry.clone(),
            live: live.clone(),
            registry: registry.clone(),
        },
        Arc::new(TokioClock::starting_at(t0())),
        &config,
    );
    Pipeline {
        store,
        telemetry,
        live,
        registry,
        resolver,
    }
}

fn identifiers(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{:09}", 200_000_000 + i)).collect()
}

// ============================================================================
// RESOLVE NAMES
// ============================================================================

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cached_vessel_is_returned_without_other_tiers() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new(),
    );
    p.store
        .vessel_upsert(&named_record("319139200", "Example", t0() - ChronoDuration::hours(1)))
        .await
        .unwrap();

    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mmsi, mmsi("319139200"));
    assert_eq!(records[0].name.as_deref(), Some("Example"));
    assert!(p.live.lookups().is_empty());
    assert_eq!(p.registry.call_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn live_source_not_queried_for_covered_identifiers() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["319139200", "227000001"]),
        FakeLiveSource::new().with_vessel(named_record("227000001", "ALPHA", t0())),
        FakeRegistry::new(),
    );
    p.store
        .vessel_upsert(&named_record("319139200", "Example", t0() - ChronoDuration::hours(3)))
        .await
        .unwrap();

    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(p.live.lookups(), vec![mmsi("227000001")]);
    assert_eq!(p.registry.call_count(), 0);
    assert_newest_first(&records);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cache_entries_outside_window_do_not_cover() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["319139200"]),
        FakeLiveSource::new().with_vessel(named_record("319139200", "RENAMED", t0())),
        FakeRegistry::new(),
    );
    p.store
        .vessel_upsert(&named_record("319139200", "Example", t0() - ChronoDuration::days(3)))
        .await
        .unwrap();

    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("RENAMED"));
    assert_eq!(p.live.lookups(), vec![mmsi("319139200")]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn live_failures_fall_through_to_registry() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["227000001", "227000002"]),
        FakeLiveSource::new().failing_for("227000001"),
        FakeRegistry::new()
            .with_vessel("227000001", "ALPHA")
            .with_vessel("227000002", "BRAVO"),
    );

    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(
        p.registry.requests(),
        vec![vec!["227000001".to_string(), "227000002".to_string()]]
    );
    assert!(p
        .store
        .vessel_get(&mmsi("227000002"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn second_resolution_stops_at_cache() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["227000001"]),
        FakeLiveSource::new(),
        FakeRegistry::new().with_vessel("227000001", "ALPHA"),
    );

    let first = p.resolver.resolve_names(None, None).await.unwrap();
    let second = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(p.registry.call_count(), 1);
    assert_eq!(p.live.lookups().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rate_limited_registry_is_skipped_without_waiting() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["227000001"]),
        FakeLiveSource::new(),
        FakeRegistry::new().with_vessel("227000001", "ALPHA"),
    );
    p.store
        .put_timestamp_setting(LAST_CALL_KEY, t0() - ChronoDuration::seconds(30))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(p.registry.call_count(), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn registry_throttle_exhaustion_still_returns_partial_result() {
    let p = pipeline(
        FakeTimeSeries::with_contexts(&["319139200", "227000001"]),
        FakeLiveSource::new().with_vessel(named_record("319139200", "Example", t0())),
        FakeRegistry::new(),
    );
    for _ in 0..20 {
        p.registry
            .push_response(RegistryResponse::error("Too frequent requests!"));
    }

    let records = p.resolver.resolve_names(None, None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("Example"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn telemetry_timeouts_propagate_after_retries() {
    let telemetry = FakeTimeSeries::new();
    for _ in 0..3 {
        telemetry.push_result(Err(tideye_test_utils::SourceError::Timeout {
            source_name: "fake-timeseries".to_string(),
            after_ms: 30_000,
        }
        .into()));
    }
    let p = pipeline(telemetry, FakeLiveSource::new(), FakeRegistry::new());

    let started = tokio::time::Instant::now();
    let result = p.resolver.resolve_names(None, None).await;

    assert_timeout(&result);
    assert_eq!(p.telemetry.call_count(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn telemetry_query_covers_requested_window() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new(),
    );

    p.resolver
        .resolve_names(Some(t0() - ChronoDuration::hours(6)), Some(t0()))
        .await
        .unwrap();

    let queries = p.telemetry.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("start: 2024-06-01T06:00:00.000Z"));
    assert!(queries[0].contains("stop: 2024-06-01T12:00:00.000Z"));
}

// ============================================================================
// REGISTRY BATCHES
// ============================================================================

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn invalid_single_identifier_yields_empty_result() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new(),
    );
    p.registry
        .push_response(RegistryResponse::error("Invalid MMSI \"000000001\""));

    let records = p
        .resolver
        .lookup_batch(&["000000001".to_string()])
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(
        p.resolver.invalid_identifiers().list().await.unwrap(),
        vec!["000000001".to_string()]
    );
    assert_eq!(
        p.store.setting_get(INVALID_MMSI_KEY).await.unwrap().as_deref(),
        Some(r#"["000000001"]"#)
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn blocklisted_identifier_is_not_requested_again() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new().with_vessel("227000001", "ALPHA"),
    );
    p.registry
        .push_response(RegistryResponse::error("Invalid MMSI \"000000001\""));

    p.resolver
        .lookup_batch(&["000000001".to_string()])
        .await
        .unwrap();
    p.resolver
        .lookup_batch(&["000000001".to_string(), "227000001".to_string()])
        .await
        .unwrap();

    let requests = p.registry.requests();
    assert_eq!(requests.len(), 2);
    assert_requests_exclude(&requests[1..], &["000000001"]);

    // Removal makes it eligible again.
    assert!(p
        .resolver
        .invalid_identifiers()
        .remove("000000001")
        .await
        .unwrap());
    p.resolver
        .lookup_batch(&["000000001".to_string()])
        .await
        .unwrap();
    assert_eq!(p.registry.requests().last(), Some(&vec!["000000001".to_string()]));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn large_batch_uses_ceil_chunks_spaced_by_interval() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new(),
    );

    p.resolver.lookup_batch(&identifiers(51)).await.unwrap();

    let times = p.registry.call_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= MINUTE);
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn lookup_waits_for_rate_limit() {
    let p = pipeline(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new().with_vessel("227000001", "ALPHA"),
    );
    p.store
        .put_timestamp_setting(LAST_CALL_KEY, t0() - ChronoDuration::seconds(45))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let records = p
        .resolver
        .lookup_batch(&["227000001".to_string()])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    let status = p.resolver.rate_limiter().status().await.unwrap();
    assert_eq!(status.last_call, Some(t0() + ChronoDuration::seconds(15)));
    assert!(!status.can_call);
    assert_eq!(status.next_call_in_secs, 60);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn custom_chunk_size_is_honoured() {
    let mut config = test_config();
    config.registry.max_per_request = 10;
    let p = pipeline_with(
        FakeTimeSeries::new(),
        FakeLiveSource::new(),
        FakeRegistry::new(),
        config,
    );

    p.resolver.lookup_batch(&identifiers(25)).await.unwrap();

    let sizes: Vec<usize> = p.registry.requests().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

// ============================================================================
// DURABLE STATE
// ============================================================================

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rate_limit_and_blocklist_survive_reopen() {
    let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");

    {
        let store = LmdbCacheStore::new(dir.path(), 16).expect("LMDB open should succeed");
        let registry = Arc::new(FakeRegistry::new());
        registry.push_response(RegistryResponse::error("Invalid MMSI \"000000001\""));
        let resolver = IdentityResolver::new(
            Arc::new(store),
            Sources {
                telemetry: Arc::new(FakeTimeSeries::new()),
                live: Arc::new(FakeLiveSource::new()),
                registry: registry.clone(),
            },
            Arc::new(TokioClock::starting_at(t0())),
            &test_config(),
        );
        resolver
            .lookup_batch(&["000000001".to_string()])
            .await
            .unwrap();
        assert_eq!(registry.call_count(), 1);
    }

    let store = LmdbCacheStore::new(dir.path(), 16).expect("LMDB reopen should succeed");
    let registry = Arc::new(FakeRegistry::new());
    let resolver = IdentityResolver::new(
        Arc::new(store),
        Sources {
            telemetry: Arc::new(FakeTimeSeries::new()),
            live: Arc::new(FakeLiveSource::new()),
            registry: registry.clone(),
        },
        Arc::new(TokioClock::starting_at(t0())),
        &test_config(),
    );

    let status = resolver.rate_limiter().status().await.unwrap();
    assert_eq!(status.last_call, Some(t0()));
    assert!(!status.can_call);

    let records = resolver
        .lookup_batch(&["000000001".to_string()])
        .await
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(registry.call_count(), 0);
}
