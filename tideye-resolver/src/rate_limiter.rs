//! Persisted rate limiter for the external registry.
//!
//! The last-call timestamp lives in the cache store under
//! [`LAST_CALL_KEY`], so the limit holds across process restarts. Within a
//! process, [`RateLimiter::acquire`] serializes the wait/dispatch/record
//! sequence so two flows cannot both observe an expired interval.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tideye_core::constants::LAST_CALL_KEY;
use tideye_core::{Clock, TideyeResult, Timestamp};
use tideye_storage::{CacheStore, SettingsExt};
use tokio::sync::{Mutex, MutexGuard};

/// Snapshot of the limiter, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Last recorded call, if any call was ever recorded.
    pub last_call: Option<Timestamp>,
    /// Whole seconds since the last call.
    pub time_since_secs: Option<i64>,
    pub can_call: bool,
    /// Seconds until a call is permitted, rounded up. Zero when `can_call`.
    pub next_call_in_secs: u64,
}

pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    gate: Mutex<()>,
}

/// Exclusive right to dispatch one registry call.
///
/// Holding the permit keeps other flows in this process out of
/// [`RateLimiter::acquire`] until [`RateLimitPermit::record`] persists the
/// call time.
pub struct RateLimitPermit<'a> {
    limiter: &'a RateLimiter,
    _guard: MutexGuard<'a, ()>,
}

impl RateLimitPermit<'_> {
    /// Persist the dispatch time and release the permit.
    pub async fn record(self, at: Timestamp) -> TideyeResult<()> {
        self.limiter.record_call(at).await
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
            gate: Mutex::new(()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn last_call(&self) -> TideyeResult<Option<Timestamp>> {
        self.store.timestamp_setting(LAST_CALL_KEY).await
    }

    /// Time left before the next call is permitted.
    ///
    /// A last call stamped in the future counts as just made.
    fn remaining(&self, last_call: Option<Timestamp>, now: Timestamp) -> Duration {
        match last_call {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                self.interval.saturating_sub(elapsed)
            }
        }
    }

    /// Sleep until the interval since the persisted last call has elapsed.
    pub async fn wait(&self) -> TideyeResult<()> {
        let last_call = self.last_call().await?;
        let remaining = self.remaining(last_call, self.clock.now());
        if !remaining.is_zero() {
            tracing::info!(
                wait_ms = remaining.as_millis() as u64,
                "Waiting for registry rate limit"
            );
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }

    /// Persist `at` as the last registry call.
    pub async fn record_call(&self, at: Timestamp) -> TideyeResult<()> {
        self.store.put_timestamp_setting(LAST_CALL_KEY, at).await
    }

    /// Wait for the interval while holding the in-process gate.
    pub async fn acquire(&self) -> TideyeResult<RateLimitPermit<'_>> {
        let guard = self.gate.lock().await;
        self.wait().await?;
        Ok(RateLimitPermit {
            limiter: self,
            _guard: guard,
        })
    }

    /// Current limiter state. Never sleeps.
    pub async fn status(&self) -> TideyeResult<RateLimitStatus> {
        let last_call = self.last_call().await?;
        let now = self.clock.now();
        let remaining = self.remaining(last_call, now);
        let next_call_in_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

        Ok(RateLimitStatus {
            last_call,
            time_since_secs: last_call.map(|last| (now - last).num_seconds()),
            can_call: remaining.is_zero(),
            next_call_in_secs,
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideye_test_utils::fixtures::t0;
    use tideye_test_utils::{InMemoryCacheStore, TokioClock};

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter(store: &InMemoryCacheStore) -> RateLimiter {
        RateLimiter::new(
            Arc::new(store.clone()),
            Arc::new(TokioClock::starting_at(t0())),
            MINUTE,
        )
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_wait_without_history_is_immediate() {
        let store = InMemoryCacheStore::new();
        let limiter = limiter(&store);

        let started = tokio::time::Instant::now();
        limiter.wait().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_wait_sleeps_remaining_interval() {
        let store = InMemoryCacheStore::new();
        let limiter = limiter(&store);
        limiter
            .record_call(t0() - chrono::Duration::seconds(20))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        limiter.wait().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_wait_rereads_persisted_timestamp() {
        let store = InMemoryCacheStore::new();
        let limiter = limiter(&store);
        limiter.wait().await.unwrap();

        // Another process records a call; the next wait must honour it.
        store
            .put_timestamp_setting(LAST_CALL_KEY, t0())
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        limiter.wait().await.unwrap();
        assert_eq!(started.elapsed(), MINUTE);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_future_last_call_waits_one_interval() {
        let store = InMemoryCacheStore::new();
        let limiter = limiter(&store);
        limiter
            .record_call(t0() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        limiter.wait().await.unwrap();
        assert_eq!(started.elapsed(), MINUTE);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_status_reports_remaining_seconds() {
        let store = InMemoryCacheStore::new();
        let limiter = limiter(&store);

        let fresh = limiter.status().await.unwrap();
        assert!(fresh.can_call);
        assert_eq!(fresh.last_call, None);
        assert_eq!(fresh.next_call_in_secs, 0);

        limiter
            .record_call(t0() - chrono::Duration::milliseconds(15_500))
            .await
            .unwrap();
        let status = limiter.status().await.unwrap();
        assert!(!status.can_call);
        assert_eq!(status.time_since_secs, Some(15));
        assert_eq!(status.next_call_in_secs, 45);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(limiter.status().await.unwrap().can_call);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_permits_serialize_dispatch() {
        let store = InMemoryCacheStore::new();
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let limiter = Arc::new(RateLimiter::new(Arc::new(store.clone()), clock.clone(), MINUTE));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let clock = clock.clone();
            handles.push(tokio::spawn(async move {
                let permit = limiter.acquire().await.unwrap();
                let dispatched = tokio::time::Instant::now();
                permit.record(clock.now()).await.unwrap();
                dispatched
            }));
        }

        let mut dispatched = Vec::new();
        for handle in handles {
            dispatched.push(handle.await.unwrap());
        }
        dispatched.sort();
        for pair in dispatched.windows(2) {
            assert!(pair[1] - pair[0] >= MINUTE);
        }
    }

    #[tokio::test]
    async fn test_status_serializes_camel_case() {
        let status = RateLimitStatus {
            last_call: None,
            time_since_secs: None,
            can_call: true,
            next_call_in_secs: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["canCall"], true);
        assert_eq!(json["nextCallInSecs"], 0);
    }
}
