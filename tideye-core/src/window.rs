//! Observation time windows

use crate::error::InputError;
use crate::identity::Timestamp;
use chrono::Duration;

/// A validated `[start, end]` observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: Timestamp,
    end: Timestamp,
}

impl TimeWindow {
    /// Validate `start <= end` and `end - start <= max_span`.
    pub fn new(start: Timestamp, end: Timestamp, max_span: Duration) -> Result<Self, InputError> {
        if start > end {
            return Err(InputError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        let span = end - start;
        if span > max_span {
            return Err(InputError::WindowTooLarge {
                requested_secs: span.num_seconds(),
                max_days: max_span.num_days(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window of length `span` ending at `end`.
    pub fn trailing(end: Timestamp, span: Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    /// Resolve optional bounds the way callers expect: `end` defaults to
    /// `now`, `start` defaults to `default_span` before `end`.
    pub fn from_bounds(
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        now: Timestamp,
        default_span: Duration,
        max_span: Duration,
    ) -> Result<Self, InputError> {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - default_span);
        Self::new(start, end, max_span)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}
