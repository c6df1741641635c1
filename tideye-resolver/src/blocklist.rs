//! Identifiers the registry has rejected as unknown.

use std::collections::HashSet;
use std::sync::Arc;

use tideye_core::constants::INVALID_MMSI_KEY;
use tideye_core::TideyeResult;
use tideye_storage::{CacheStore, SettingsExt};
use tokio::sync::Mutex;

/// Persisted set of identifiers never to send to the registry again.
///
/// Stored as a JSON array under [`INVALID_MMSI_KEY`]. Mutations are
/// read-modify-write and are serialized within the process.
pub struct InvalidIdentifiers {
    store: Arc<dyn CacheStore>,
    gate: Mutex<()>,
}

impl InvalidIdentifiers {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    /// Blocklisted identifiers in insertion order.
    pub async fn list(&self) -> TideyeResult<Vec<String>> {
        self.store.string_list_setting(INVALID_MMSI_KEY).await
    }

    pub async fn snapshot(&self) -> TideyeResult<HashSet<String>> {
        Ok(self.list().await?.into_iter().collect())
    }

    pub async fn contains(&self, id: &str) -> TideyeResult<bool> {
        Ok(self.list().await?.iter().any(|known| known == id))
    }

    /// Add `id`. Returns `false` if it was already present.
    pub async fn add(&self, id: &str) -> TideyeResult<bool> {
        let _guard = self.gate.lock().await;
        let mut ids = self.list().await?;
        if ids.iter().any(|known| known == id) {
            return Ok(false);
        }
        ids.push(id.to_string());
        self.store
            .put_string_list_setting(INVALID_MMSI_KEY, &ids)
            .await?;
        tracing::warn!(mmsi = id, total = ids.len(), "Identifier blocklisted");
        Ok(true)
    }

    /// Remove `id`. Removing an absent identifier is a no-op returning `false`.
    pub async fn remove(&self, id: &str) -> TideyeResult<bool> {
        let _guard = self.gate.lock().await;
        let mut ids = self.list().await?;
        let before = ids.len();
        ids.retain(|known| known != id);
        if ids.len() == before {
            return Ok(false);
        }
        self.store
            .put_string_list_setting(INVALID_MMSI_KEY, &ids)
            .await?;
        tracing::info!(mmsi = id, "Identifier removed from blocklist");
        Ok(true)
    }
}

impl std::fmt::Debug for InvalidIdentifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidIdentifiers").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideye_test_utils::InMemoryCacheStore;

    fn blocklist() -> (InMemoryCacheStore, InvalidIdentifiers) {
        let store = InMemoryCacheStore::new();
        let blocklist = InvalidIdentifiers::new(Arc::new(store.clone()));
        (store, blocklist)
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_, blocklist) = blocklist();
        assert!(blocklist.add("000000001").await.unwrap());
        assert!(!blocklist.add("000000001").await.unwrap());
        assert_eq!(blocklist.list().await.unwrap(), vec!["000000001".to_string()]);
    }

    #[tokio::test]
    async fn test_persists_as_json_array() {
        let (store, blocklist) = blocklist();
        blocklist.add("000000001").await.unwrap();
        blocklist.add("000000002").await.unwrap();

        let raw = store.setting_get(INVALID_MMSI_KEY).await.unwrap();
        assert_eq!(raw.as_deref(), Some(r#"["000000001","000000002"]"#));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_, blocklist) = blocklist();
        blocklist.add("000000001").await.unwrap();

        assert!(blocklist.remove("000000001").await.unwrap());
        assert!(!blocklist.contains("000000001").await.unwrap());
        assert!(!blocklist.remove("000000001").await.unwrap());
        assert!(blocklist.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let (_, blocklist) = blocklist();
        let blocklist = Arc::new(blocklist);

        let handles: Vec<_> = (1..=10)
            .map(|i| {
                let blocklist = blocklist.clone();
                tokio::spawn(async move { blocklist.add(&format!("{:09}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(blocklist.snapshot().await.unwrap().len(), 10);
    }
}
