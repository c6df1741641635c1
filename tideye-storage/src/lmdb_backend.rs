//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped,
//! transactional key-value store. Three named databases live in one
//! environment:
//!
//! - `vessels`: identifier bytes -> JSON [`VesselRecord`]
//! - `settings`: key bytes -> UTF-8 value
//! - `positions`: big-endian `u64` sequence -> JSON [`PositionSample`]
//!
//! Upserts read and write the stored record inside a single write
//! transaction, so concurrent upserts for the same vessel cannot lose a
//! merged name or position.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tideye_core::{
    sort_newest_first, Mmsi, PositionSample, StorageConfig, StorageError, TideyeError,
    TideyeResult, Timestamp, VesselRecord,
};

use crate::store::CacheStore;

const VESSELS_DB: &str = "vessels";
const SETTINGS_DB: &str = "settings";
const POSITIONS_DB: &str = "positions";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a named database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: &'static str, reason: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for TideyeError {
    fn from(e: LmdbStoreError) -> Self {
        TideyeError::Storage(StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed [`CacheStore`].
///
/// # Example
///
/// ```ignore
/// let store = LmdbCacheStore::new("/var/lib/tideye", 256)?;
/// store.vessel_upsert(&record).await?;
/// let cached = store.vessel_get(&record.mmsi).await?;
/// ```
pub struct LmdbCacheStore {
    env: Env,
    vessels: Database<Bytes, Bytes>,
    settings: Database<Bytes, Bytes>,
    positions: Database<Bytes, Bytes>,
    /// Next key for the positions database.
    next_position: AtomicU64,
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .field("next_position", &self.next_position.load(Ordering::Relaxed))
            .finish()
    }
}

impl LmdbCacheStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the map in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows", max_size_mb))
        })?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let open = |wtxn: &mut heed::RwTxn<'_>, name: &'static str| {
            env.create_database::<Bytes, Bytes>(wtxn, Some(name))
                .map_err(|e| LmdbStoreError::DbOpen {
                    name,
                    reason: e.to_string(),
                })
        };
        let vessels = open(&mut wtxn, VESSELS_DB)?;
        let settings = open(&mut wtxn, SETTINGS_DB)?;
        let positions = open(&mut wtxn, POSITIONS_DB)?;
        wtxn.commit().map_err(txn_err)?;

        let next_position = {
            let rtxn = env.read_txn().map_err(txn_err)?;
            match positions.last(&rtxn).map_err(txn_err)? {
                Some((key, _)) => decode_sequence(key)? + 1,
                None => 0,
            }
        };

        tracing::debug!(
            path = %path.as_ref().display(),
            max_size_mb,
            next_position,
            "Opened LMDB cache store"
        );

        Ok(Self {
            env,
            vessels,
            settings,
            positions,
            next_position: AtomicU64::new(next_position),
        })
    }

    /// Open the store described by a [`StorageConfig`].
    pub fn open(config: &StorageConfig) -> Result<Self, LmdbStoreError> {
        Self::new(&config.path, config.max_size_mb)
    }
}

fn decode_sequence(key: &[u8]) -> Result<u64, LmdbStoreError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| LmdbStoreError::Deserialization("Invalid position key".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_record(bytes: &[u8]) -> Result<VesselRecord, LmdbStoreError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization(e.to_string()))
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn vessel_get(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self
            .vessels
            .get(&rtxn, mmsi.as_str().as_bytes())
            .map_err(txn_err)?
        {
            Some(bytes) => Ok(Some(decode_record(bytes)?)),
            None => Ok(None),
        }
    }

    async fn vessel_list_by_observed_range(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> TideyeResult<Vec<VesselRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut records = Vec::new();
        for entry in self.vessels.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = entry.map_err(txn_err)?;
            let record = decode_record(bytes)?;
            if start <= record.last_seen && record.last_seen <= end {
                records.push(record);
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn vessel_upsert(&self, record: &VesselRecord) -> TideyeResult<()> {
        let key = record.mmsi.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let stored = match self.vessels.get(&wtxn, key).map_err(txn_err)? {
            Some(bytes) => Some(decode_record(bytes)?),
            None => None,
        };
        let merged = match stored {
            Some(stored) => record.clone().merged_over(&stored),
            None => record.clone(),
        };

        let value = serde_json::to_vec(&merged)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        self.vessels.put(&mut wtxn, key, &value).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn setting_get(&self, key: &str) -> TideyeResult<Option<String>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.settings.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => {
                let value = std::str::from_utf8(bytes).map_err(|e| {
                    StorageError::CorruptSetting {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(value.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn setting_put(&self, key: &str, value: &str) -> TideyeResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.settings
            .put(&mut wtxn, key.as_bytes(), value.as_bytes())
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn position_append(&self, sample: &PositionSample) -> TideyeResult<()> {
        let value = serde_json::to_vec(sample)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        let sequence = self.next_position.fetch_add(1, Ordering::SeqCst);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.positions
            .put(&mut wtxn, &sequence.to_be_bytes(), &value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn position_list(&self, mmsi: &Mmsi) -> TideyeResult<Vec<PositionSample>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut samples = Vec::new();
        for entry in self.positions.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = entry.map_err(txn_err)?;
            let sample: PositionSample = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            if &sample.mmsi == mmsi {
                samples.push(sample);
            }
        }
        Ok(samples)
    }
}
