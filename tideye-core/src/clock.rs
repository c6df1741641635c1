//! Wall-clock abstraction.
//!
//! The rate limiter persists epoch-millisecond timestamps, so it needs wall
//! time rather than a monotonic instant. Tests substitute a clock driven by
//! tokio's paused timer (see `tideye-test-utils`).

use crate::identity::Timestamp;
use chrono::Utc;
use std::fmt::Debug;

/// Port for obtaining the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}

/// System clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
