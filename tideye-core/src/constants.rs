//! Shared constants and defaults.

use std::time::Duration;

/// Settings key holding the last external-registry call (epoch ms, decimal).
pub const LAST_CALL_KEY: &str = "aishub_last_call";

/// Settings key holding the invalid-identifier set (JSON array of strings).
pub const INVALID_MMSI_KEY: &str = "aishub_invalid_mmsis";

/// Minimum spacing between external-registry calls.
pub const DEFAULT_RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum identifiers the registry accepts per request.
pub const MAX_IDENTIFIERS_PER_REQUEST: usize = 25;

/// Throttle restarts the batch provider attempts before giving up.
pub const DEFAULT_MAX_THROTTLE_RESTARTS: u32 = 5;

/// Per-attempt timeout for telemetry queries.
pub const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts per telemetry query.
pub const DEFAULT_TELEMETRY_MAX_RETRIES: u32 = 3;

/// Widest window `resolve_names` accepts, in days.
pub const MAX_QUERY_DAYS: i64 = 7;

/// Window used when the caller gives no start time, in hours.
pub const DEFAULT_QUERY_HOURS: i64 = 24;

/// Time-series bucket holding Signal K telemetry.
pub const DEFAULT_BUCKET: &str = "Tideye";

/// Default AISHub web service endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://data.aishub.net/ws.php";
