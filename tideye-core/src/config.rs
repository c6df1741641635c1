//! Configuration types
//!
//! Configuration is loaded from environment variables with defaults that
//! match the production deployment. Every section validates itself before
//! the resolver is built.

use crate::constants::*;
use crate::error::{ConfigError, TideyeResult};
use chrono::Duration as ChronoDuration;
use std::path::PathBuf;
use std::time::Duration;

/// External registry (AISHub) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub base_url: String,
    /// Account name sent as the `username` credential.
    pub username: Option<String>,
    pub rate_limit_interval: Duration,
    pub max_per_request: usize,
    pub max_throttle_restarts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            username: None,
            rate_limit_interval: DEFAULT_RATE_LIMIT_INTERVAL,
            max_per_request: MAX_IDENTIFIERS_PER_REQUEST,
            max_throttle_restarts: DEFAULT_MAX_THROTTLE_RESTARTS,
        }
    }
}

/// Time-series (InfluxDB) source configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            org: None,
            bucket: DEFAULT_BUCKET.to_string(),
            timeout: DEFAULT_TELEMETRY_TIMEOUT,
            max_retries: DEFAULT_TELEMETRY_MAX_RETRIES,
        }
    }
}

/// Live vessel source (Signal K) configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveSourceConfig {
    pub url: Option<String>,
}

/// Resolver window limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub max_window: ChronoDuration,
    pub default_window: ChronoDuration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_window: ChronoDuration::days(MAX_QUERY_DAYS),
            default_window: ChronoDuration::hours(DEFAULT_QUERY_HOURS),
        }
    }
}

/// Durable cache store configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/tideye"),
            max_size_mb: 256,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TideyeConfig {
    pub registry: RegistryConfig,
    pub telemetry: TelemetryConfig,
    pub live: LiveSourceConfig,
    pub resolver: ResolverConfig,
    pub storage: StorageConfig,
}

impl TideyeConfig {
    /// Create TideyeConfig from environment variables.
    ///
    /// Environment variables:
    /// - `AISHUB_USERNAME`: registry credential (required for registry calls)
    /// - `TIDEYE_REGISTRY_URL`: registry endpoint (default: AISHub web service)
    /// - `TIDEYE_RATE_LIMIT_SECS`: minimum seconds between registry calls (default: 60)
    /// - `TIDEYE_REGISTRY_CHUNK_SIZE`: identifiers per registry request (default: 25)
    /// - `TIDEYE_MAX_THROTTLE_RESTARTS`: throttle restarts per batch (default: 5)
    /// - `INFLUXDB_URL`, `INFLUXDB_TOKEN`, `INFLUXDB_ORG_ID`: time-series source
    /// - `TIDEYE_INFLUX_BUCKET`: bucket name (default: "Tideye")
    /// - `TIDEYE_QUERY_TIMEOUT_SECS`: per-attempt telemetry timeout (default: 30)
    /// - `TIDEYE_QUERY_MAX_RETRIES`: telemetry attempts (default: 3)
    /// - `SIGNALK_URL`: live vessel source
    /// - `TIDEYE_MAX_WINDOW_DAYS`: widest resolve window (default: 7)
    /// - `TIDEYE_DATA_DIR`: LMDB directory (default: ./data/tideye)
    /// - `TIDEYE_DB_MAX_SIZE_MB`: LMDB map size (default: 256)
    pub fn from_env() -> TideyeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> TideyeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("TIDEYE_REGISTRY_URL") {
            config.registry.base_url = url;
        }
        config.registry.username = get("AISHUB_USERNAME");
        if let Some(secs) = parse_opt::<u64>(&get, "TIDEYE_RATE_LIMIT_SECS")? {
            config.registry.rate_limit_interval = Duration::from_secs(secs);
        }
        if let Some(size) = parse_opt::<usize>(&get, "TIDEYE_REGISTRY_CHUNK_SIZE")? {
            config.registry.max_per_request = size;
        }
        if let Some(restarts) = parse_opt::<u32>(&get, "TIDEYE_MAX_THROTTLE_RESTARTS")? {
            config.registry.max_throttle_restarts = restarts;
        }

        config.telemetry.url = get("INFLUXDB_URL");
        config.telemetry.token = get("INFLUXDB_TOKEN");
        config.telemetry.org = get("INFLUXDB_ORG_ID");
        if let Some(bucket) = get("TIDEYE_INFLUX_BUCKET") {
            config.telemetry.bucket = bucket;
        }
        if let Some(secs) = parse_opt::<u64>(&get, "TIDEYE_QUERY_TIMEOUT_SECS")? {
            config.telemetry.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_opt::<u32>(&get, "TIDEYE_QUERY_MAX_RETRIES")? {
            config.telemetry.max_retries = retries;
        }

        config.live.url = get("SIGNALK_URL");

        if let Some(days) = parse_opt::<i64>(&get, "TIDEYE_MAX_WINDOW_DAYS")? {
            config.resolver.max_window = ChronoDuration::try_days(days).ok_or_else(|| {
                invalid("TIDEYE_MAX_WINDOW_DAYS", &days.to_string(), "out of range")
            })?;
        }

        if let Some(dir) = get("TIDEYE_DATA_DIR") {
            config.storage.path = PathBuf::from(dir);
        }
        if let Some(size) = parse_opt::<usize>(&get, "TIDEYE_DB_MAX_SIZE_MB")? {
            config.storage.max_size_mb = size;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline misbehave.
    pub fn validate(&self) -> TideyeResult<()> {
        if self.registry.rate_limit_interval.is_zero() {
            return Err(invalid("TIDEYE_RATE_LIMIT_SECS", "0", "must be positive"));
        }
        if self.registry.max_per_request == 0 {
            return Err(invalid("TIDEYE_REGISTRY_CHUNK_SIZE", "0", "must be positive"));
        }
        if self.telemetry.max_retries == 0 {
            return Err(invalid("TIDEYE_QUERY_MAX_RETRIES", "0", "must be at least 1"));
        }
        if self.telemetry.timeout.is_zero() {
            return Err(invalid("TIDEYE_QUERY_TIMEOUT_SECS", "0", "must be positive"));
        }
        if self.resolver.max_window <= ChronoDuration::zero() {
            return Err(invalid(
                "TIDEYE_MAX_WINDOW_DAYS",
                &self.resolver.max_window.num_days().to_string(),
                "must be positive",
            ));
        }
        if self.resolver.default_window > self.resolver.max_window {
            return Err(invalid(
                "TIDEYE_MAX_WINDOW_DAYS",
                &self.resolver.max_window.num_days().to_string(),
                "must cover the default 24 hour window",
            ));
        }
        Ok(())
    }
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> TideyeResult<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, &raw, "not a number")),
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::error::TideyeError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TideyeError;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TideyeConfig::default();
        assert_eq!(config.registry.rate_limit_interval, Duration::from_secs(60));
        assert_eq!(config.registry.max_per_request, 25);
        assert_eq!(config.telemetry.timeout, Duration::from_secs(30));
        assert_eq!(config.telemetry.max_retries, 3);
        assert_eq!(config.telemetry.bucket, "Tideye");
        assert_eq!(config.resolver.max_window, ChronoDuration::days(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = TideyeConfig::from_lookup(lookup(&[
            ("AISHUB_USERNAME", "AH_TEST"),
            ("INFLUXDB_URL", "http://influx:8086"),
            ("INFLUXDB_TOKEN", "secret"),
            ("INFLUXDB_ORG_ID", "org"),
            ("SIGNALK_URL", "http://signalk:3000"),
            ("TIDEYE_RATE_LIMIT_SECS", "90"),
            ("TIDEYE_QUERY_MAX_RETRIES", "5"),
            ("TIDEYE_DATA_DIR", "/var/lib/tideye"),
        ]))
        .unwrap();

        assert_eq!(config.registry.username.as_deref(), Some("AH_TEST"));
        assert_eq!(config.registry.rate_limit_interval, Duration::from_secs(90));
        assert_eq!(config.telemetry.max_retries, 5);
        assert_eq!(config.telemetry.url.as_deref(), Some("http://influx:8086"));
        assert_eq!(config.telemetry.token.as_deref(), Some("secret"));
        assert_eq!(config.telemetry.org.as_deref(), Some("org"));
        assert_eq!(config.live.url.as_deref(), Some("http://signalk:3000"));
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/tideye"));
    }

    #[test]
    fn test_from_lookup_rejects_garbage_number() {
        let err = TideyeConfig::from_lookup(lookup(&[("TIDEYE_RATE_LIMIT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            TideyeError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "TIDEYE_RATE_LIMIT_SECS"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let err = TideyeConfig::from_lookup(lookup(&[("TIDEYE_REGISTRY_CHUNK_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, TideyeError::Config(_)));
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_window() {
        let days = i64::MAX.to_string();
        let err = TideyeConfig::from_lookup(lookup(&[("TIDEYE_MAX_WINDOW_DAYS", &days)]))
            .unwrap_err();
        assert!(matches!(
            err,
            TideyeError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "TIDEYE_MAX_WINDOW_DAYS"
        ));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = TideyeConfig::from_lookup(lookup(&[("AISHUB_USERNAME", "  ")])).unwrap();
        assert!(config.registry.username.is_none());
    }
}
