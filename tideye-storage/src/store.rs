//! Async cache store trait.
//!
//! The cache store owns every persisted entity: vessel records, the settings
//! used for rate-limit bookkeeping and the invalid-identifier set, and the
//! append-only position history. Nothing else writes them.

use ::async_trait::async_trait;
use tideye_core::{
    from_epoch_millis, to_epoch_millis, Mmsi, PositionSample, StorageError, TideyeResult,
    Timestamp, VesselRecord,
};

/// Async storage trait for the durable vessel cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    // ========================================================================
    // VESSEL OPERATIONS
    // ========================================================================

    /// Get a vessel record by identifier.
    async fn vessel_get(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>>;

    /// List records last observed within `[start, end]`, newest first.
    async fn vessel_list_by_observed_range(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> TideyeResult<Vec<VesselRecord>>;

    /// Insert or update a record, keyed by identifier.
    ///
    /// The incoming record wins for name, timestamp and metadata; a missing
    /// name or position keeps the stored value.
    async fn vessel_upsert(&self, record: &VesselRecord) -> TideyeResult<()>;

    // ========================================================================
    // SETTINGS OPERATIONS
    // ========================================================================

    /// Read a string setting.
    async fn setting_get(&self, key: &str) -> TideyeResult<Option<String>>;

    /// Write a string setting, replacing any previous value.
    async fn setting_put(&self, key: &str, value: &str) -> TideyeResult<()>;

    // ========================================================================
    // POSITION HISTORY
    // ========================================================================

    /// Append a position sample. Every call adds a new row.
    async fn position_append(&self, sample: &PositionSample) -> TideyeResult<()>;

    /// All samples for a vessel in observation order.
    async fn position_list(&self, mmsi: &Mmsi) -> TideyeResult<Vec<PositionSample>>;
}

/// Typed accessors over the string settings.
///
/// Settings are stored as plain strings so any store engine can hold them;
/// this trait owns the encodings (decimal epoch millis, JSON arrays).
#[async_trait]
pub trait SettingsExt: CacheStore {
    /// Read a timestamp stored as decimal epoch milliseconds.
    async fn timestamp_setting(&self, key: &str) -> TideyeResult<Option<Timestamp>> {
        match self.setting_get(key).await? {
            None => Ok(None),
            Some(raw) => {
                let millis = raw.trim().parse::<i64>().map_err(|e| {
                    StorageError::CorruptSetting {
                        key: key.to_string(),
                        reason: format!("not epoch millis: {}", e),
                    }
                })?;
                Ok(Some(from_epoch_millis(millis)))
            }
        }
    }

    /// Write a timestamp as decimal epoch milliseconds.
    async fn put_timestamp_setting(&self, key: &str, at: Timestamp) -> TideyeResult<()> {
        self.setting_put(key, &to_epoch_millis(at).to_string()).await
    }

    /// Read a JSON array of strings. Absent means empty.
    async fn string_list_setting(&self, key: &str) -> TideyeResult<Vec<String>> {
        match self.setting_get(key).await? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::CorruptSetting {
                    key: key.to_string(),
                    reason: format!("not a JSON string array: {}", e),
                }
                .into()
            }),
        }
    }

    /// Write a JSON array of strings.
    async fn put_string_list_setting(&self, key: &str, values: &[String]) -> TideyeResult<()> {
        let encoded = serde_json::to_string(values).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.setting_put(key, &encoded).await
    }
}

impl<T: CacheStore + ?Sized> SettingsExt for T {}
