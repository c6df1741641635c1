//! Tideye Storage - Cache Store Trait and Implementations
//!
//! Defines the durable cache for vessel records, settings and position
//! history, with an in-memory store for tests and an LMDB store for
//! deployments.

pub mod lmdb_backend;
pub mod memory;
pub mod store;

pub use lmdb_backend::{LmdbCacheStore, LmdbStoreError};
pub use memory::InMemoryCacheStore;
pub use store::{CacheStore, SettingsExt};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
