//! Tideye Core - Vessel Identity Types
//!
//! Pure data structures shared by every Tideye crate: identifiers, vessel
//! records, time windows, errors and configuration. This crate performs no
//! I/O.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod vessel;
pub mod window;

pub use clock::{Clock, SystemClock};
pub use config::{
    LiveSourceConfig, RegistryConfig, ResolverConfig, StorageConfig, TelemetryConfig,
    TideyeConfig,
};
pub use error::{
    ConfigError, InputError, RegistryError, SourceError, StorageError, TideyeError, TideyeResult,
};
pub use identity::{Mmsi, Timestamp};
pub use vessel::{normalize_name, sort_newest_first, Position, PositionSample, VesselRecord};
pub use window::TimeWindow;

/// Epoch milliseconds of a timestamp, as persisted in the settings store.
pub fn to_epoch_millis(at: Timestamp) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_epoch_millis`]. Out-of-range values clamp to the epoch.
pub fn from_epoch_millis(millis: i64) -> Timestamp {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)
}
