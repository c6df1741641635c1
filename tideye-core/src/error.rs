//! Error types for Tideye operations

use thiserror::Error;

/// Caller input errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Invalid MMSI {value:?}: expected exactly 9 digits")]
    InvalidIdentifier { value: String },

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("Date range too large: {requested_secs}s requested, maximum is {max_days} days")]
    WindowTooLarge { requested_secs: i64, max_days: i64 },
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Corrupt setting {key}: {reason}")]
    CorruptSetting { key: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Transient failures of the telemetry, live and registry sources.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Query to {source_name} timed out after {after_ms}ms")]
    Timeout { source_name: String, after_ms: u64 },

    #[error("Request to {source_name} failed with status {status}: {message}")]
    RequestFailed {
        source_name: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {source_name}: {reason}")]
    InvalidResponse { source_name: String, reason: String },
}

/// External registry errors that escape the batch provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry still throttling after {attempts} restarts")]
    ThrottleRetriesExhausted { attempts: u32 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tideye errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TideyeError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TideyeError {
    /// True for caller mistakes that must not be retried.
    pub fn is_input(&self) -> bool {
        matches!(self, TideyeError::Input(_))
    }
}

/// Result type alias for Tideye operations.
pub type TideyeResult<T> = Result<T, TideyeError>;

// =============================================================================
// TESTS
// =============================================================================
