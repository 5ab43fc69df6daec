//! Bounded, ordered replay log.

use crate::error::PersistenceResult;
use crate::store::{CacheEntry, CacheStore};
use std::sync::Arc;
use tracing::debug;

/// Default number of entries kept in the replay log.
pub const DEFAULT_CAPACITY: usize = 300;

/// Result of appending to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry written; `evicted` oldest entries were dropped to stay in bounds.
    Appended { evicted: usize },
    /// Identifier was already in the log; nothing written.
    AlreadyPresent,
}

/// FIFO-bounded log of accepted sightings on top of a `CacheStore`.
///
/// Every append is a read-modify-write of the whole log. There is no
/// cross-process locking: a concurrent writer may win the race.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn CacheStore>,
    capacity: usize,
}

impl TokenCache {
    pub fn new(store: Arc<dyn CacheStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Load the log, keeping only the `capacity` most recent entries.
    pub fn load(&self) -> PersistenceResult<Vec<CacheEntry>> {
        let mut entries = self.store.load()?;
        trim_front(&mut entries, self.capacity);
        Ok(entries)
    }

    /// Append an entry, evicting the oldest ones on overflow.
    ///
    /// A read failure aborts the append so an unreadable log is never
    /// clobbered by a one-entry rewrite.
    pub fn append(&self, entry: CacheEntry) -> PersistenceResult<AppendOutcome> {
        let mut entries = self.store.load()?;
        if entries.iter().any(|e| e.identifier == entry.identifier) {
            return Ok(AppendOutcome::AlreadyPresent);
        }

        entries.push(entry);
        let evicted = trim_front(&mut entries, self.capacity);
        self.store.store(&entries)?;

        if evicted > 0 {
            debug!(evicted, size = entries.len(), "Evicted oldest cache entries");
        }
        Ok(AppendOutcome::Appended { evicted })
    }

    pub fn clear(&self) -> PersistenceResult<()> {
        self.store.clear()
    }
}

fn trim_front(entries: &mut Vec<CacheEntry>, capacity: usize) -> usize {
    let excess = entries.len().saturating_sub(capacity);
    if excess > 0 {
        entries.drain(..excess);
    }
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::JsonLinesCache;
    use crate::store::MemoryCache;
    use lpd_core::{CategoryKey, Identifier};
    use tempfile::TempDir;

    fn entry(id: usize) -> CacheEntry {
        CacheEntry::new(
            Identifier::new(format!("id_{id}")).unwrap(),
            CategoryKey::new("uxento"),
        )
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), 5);
        for n in [3usize, 12] {
            cache.clear().unwrap();
            for i in 0..n {
                cache.append(entry(i)).unwrap();
            }
            let loaded = cache.load().unwrap();
            assert_eq!(loaded.len(), n.min(5));
            let first = n.saturating_sub(5);
            let ids: Vec<_> = loaded.iter().map(|e| e.identifier.to_string()).collect();
            let expected: Vec<_> = (first..n).map(|i| format!("id_{i}")).collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn test_append_reports_eviction() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), 2);
        assert_eq!(
            cache.append(entry(0)).unwrap(),
            AppendOutcome::Appended { evicted: 0 }
        );
        cache.append(entry(1)).unwrap();
        assert_eq!(
            cache.append(entry(2)).unwrap(),
            AppendOutcome::Appended { evicted: 1 }
        );
    }

    #[test]
    fn test_append_skips_present_identifier() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), 10);
        cache.append(entry(1)).unwrap();
        assert_eq!(
            cache.append(entry(1)).unwrap(),
            AppendOutcome::AlreadyPresent
        );
        assert_eq!(cache.load().unwrap().len(), 1);
    }

    #[test]
    fn test_load_trims_oversized_log() {
        let store = MemoryCache::with_entries((0..8).map(entry).collect());
        let cache = TokenCache::new(Arc::new(store), 3);
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].identifier.as_str(), "id_5");
    }

    #[test]
    fn test_file_backed_log_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token_cache.jsonl");

        {
            let cache = TokenCache::new(Arc::new(JsonLinesCache::new(&path)), 4);
            for i in 0..6 {
                cache.append(entry(i)).unwrap();
            }
        }

        let reopened = TokenCache::new(Arc::new(JsonLinesCache::new(&path)), 4);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].identifier.as_str(), "id_2");
        assert_eq!(loaded[3].identifier.as_str(), "id_5");
    }
}
