//! Cache records and the storage seam.

use crate::error::PersistenceResult;
use chrono::Utc;
use lpd_core::{CategoryKey, Identifier};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One persisted sighting.
///
/// Field aliases accept records written with the legacy names
/// (`mint`, `launchpad`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(alias = "mint")]
    pub identifier: Identifier,
    #[serde(alias = "launchpad")]
    pub category: CategoryKey,
    #[serde(alias = "timestamp", default)]
    pub timestamp_ms: i64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(identifier: Identifier, category: CategoryKey) -> Self {
        Self {
            identifier,
            category,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Whole-log storage backend.
///
/// Implementations replace the stored log atomically where they can; there is
/// no locking across concurrent writers.
pub trait CacheStore: Send + Sync {
    /// Read the stored log, oldest first.
    fn load(&self) -> PersistenceResult<Vec<CacheEntry>>;

    /// Replace the stored log.
    fn store(&self, entries: &[CacheEntry]) -> PersistenceResult<()>;

    /// Remove the stored log.
    fn clear(&self) -> PersistenceResult<()>;
}

/// In-memory store, used when no cache file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Vec<CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing entries (simulates a previous run).
    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn load(&self) -> PersistenceResult<Vec<CacheEntry>> {
        Ok(self.entries.lock().clone())
    }

    fn store(&self, entries: &[CacheEntry]) -> PersistenceResult<()> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }

    fn clear(&self) -> PersistenceResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
