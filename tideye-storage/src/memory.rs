//! In-memory cache store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tideye_core::{
    sort_newest_first, Mmsi, PositionSample, StorageError, TideyeResult, Timestamp, VesselRecord,
};

use crate::store::CacheStore;

/// Map-backed [`CacheStore`]. Clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    vessels: Arc<RwLock<HashMap<Mmsi, VesselRecord>>>,
    settings: Arc<RwLock<HashMap<String, String>>>,
    positions: Arc<RwLock<Vec<PositionSample>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vessel records.
    pub fn vessel_count(&self) -> usize {
        self.vessels.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Number of stored position samples.
    pub fn position_count(&self) -> usize {
        self.positions.read().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn vessel_get(&self, mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>> {
        let vessels = self.vessels.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(vessels.get(mmsi).cloned())
    }

    async fn vessel_list_by_observed_range(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> TideyeResult<Vec<VesselRecord>> {
        let vessels = self.vessels.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut records: Vec<VesselRecord> = vessels
            .values()
            .filter(|r| start <= r.last_seen && r.last_seen <= end)
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn vessel_upsert(&self, record: &VesselRecord) -> TideyeResult<()> {
        let mut vessels = self.vessels.write().map_err(|_| StorageError::LockPoisoned)?;
        let merged = match vessels.get(&record.mmsi) {
            Some(stored) => record.clone().merged_over(stored),
            None => record.clone(),
        };
        vessels.insert(record.mmsi.clone(), merged);
        Ok(())
    }

    async fn setting_get(&self, key: &str) -> TideyeResult<Option<String>> {
        let settings = self.settings.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(settings.get(key).cloned())
    }

    async fn setting_put(&self, key: &str, value: &str) -> TideyeResult<()> {
        let mut settings = self.settings.write().map_err(|_| StorageError::LockPoisoned)?;
        settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn position_append(&self, sample: &PositionSample) -> TideyeResult<()> {
        let mut positions = self.positions.write().map_err(|_| StorageError::LockPoisoned)?;
        positions.push(sample.clone());
        Ok(())
    }

    async fn position_list(&self, mmsi: &Mmsi) -> TideyeResult<Vec<PositionSample>> {
        let positions = self.positions.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(positions.iter().filter(|s| &s.mmsi == mmsi).cloned().collect())
    }
}
