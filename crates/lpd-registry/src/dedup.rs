//! Identifier deduplication with a persisted replay log.
//!
//! `try_accept` is the only novelty gate: counting, caching, notifying and
//! annotating all happen iff it returned `true`.

use lpd_core::{resolve_category, Category, CategoryDef, CategoryKey, Identifier};
use lpd_persistence::{AppendOutcome, CacheEntry, TokenCache};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Classified identifiers accepted (persisted + this session).
    pub total_detected: u64,
    pub per_category: BTreeMap<CategoryKey, u64>,
    /// Unclassified identifiers accepted, including cached ones whose
    /// category is no longer configured.
    pub other: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    seen: HashSet<Identifier>,
    /// Classified identifiers in acceptance order.
    known: Vec<(Identifier, CategoryKey)>,
    per_category: BTreeMap<CategoryKey, u64>,
    other: u64,
}

impl RegistryState {
    fn record(&mut self, identifier: &Identifier, category: &Category) -> bool {
        if !self.seen.insert(identifier.clone()) {
            return false;
        }
        match category {
            Category::Launchpad(key) => {
                *self.per_category.entry(key.clone()).or_default() += 1;
                self.known.push((identifier.clone(), key.clone()));
            }
            Category::Unclassified => self.other += 1,
        }
        true
    }
}

/// Process-lifetime set of handled identifiers.
pub struct DedupRegistry {
    state: Mutex<RegistryState>,
    cache: TokenCache,
}

impl DedupRegistry {
    /// Empty registry writing through to `cache`.
    pub fn new(cache: TokenCache) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            cache,
        }
    }

    /// Cold start: load the persisted log and seed from it, resolving
    /// cached categories against `defs`.
    ///
    /// An unreadable log is treated as empty.
    pub fn open(cache: TokenCache, defs: &[CategoryDef]) -> Self {
        let entries = match cache.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load token cache, starting empty");
                Vec::new()
            }
        };

        let registry = Self::new(cache);
        let seeded = registry.seed(&entries, defs);
        info!(seeded, "Dedup registry initialized from cache");
        registry
    }

    /// Bulk-load previously cached entries; returns how many were new.
    ///
    /// A cached category matches a definition by key or by label. Entries
    /// matching none are still deduplicated but land in the other bucket.
    pub fn seed(&self, entries: &[CacheEntry], defs: &[CategoryDef]) -> usize {
        let mut state = self.state.lock();
        entries
            .iter()
            .filter(|entry| {
                let category = match resolve_category(defs, entry.category.as_str()) {
                    Some(def) => Category::Launchpad(def.key.clone()),
                    None => {
                        warn!(
                            identifier = %entry.identifier,
                            category = %entry.category,
                            "Cached category is not configured, counting as other"
                        );
                        Category::Unclassified
                    }
                };
                state.record(&entry.identifier, &category)
            })
            .count()
    }

    /// `true` exactly once per identifier for the process lifetime.
    pub fn try_accept(&self, identifier: &Identifier, category: &Category) -> bool {
        self.state.lock().record(identifier, category)
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.state.lock().seen.contains(identifier)
    }

    /// Append to the persisted log. Failures are logged and swallowed;
    /// the return value reports whether the write went through.
    pub fn persist(&self, identifier: &Identifier, category: &CategoryKey) -> bool {
        let entry = CacheEntry::new(identifier.clone(), category.clone());
        match self.cache.append(entry) {
            Ok(AppendOutcome::Appended { evicted }) => {
                debug!(%identifier, %category, evicted, "Cached token");
                true
            }
            Ok(AppendOutcome::AlreadyPresent) => true,
            Err(e) => {
                warn!(%identifier, error = %e, "Failed to persist token cache");
                false
            }
        }
    }

    /// Forget everything, in memory and on disk.
    pub fn reset(&self) {
        *self.state.lock() = RegistryState::default();
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear token cache");
        }
        info!("Dedup registry reset");
    }

    /// Classified identifiers known this process lifetime, oldest first.
    pub fn known_entries(&self) -> Vec<(Identifier, CategoryKey)> {
        self.state.lock().known.clone()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            total_detected: state.known.len() as u64,
            per_category: state.per_category.clone(),
            other: state.other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpd_core::default_categories;
    use lpd_persistence::{
        CacheStore, JsonLinesCache, MemoryCache, PersistenceError, PersistenceResult,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn uxento() -> Category {
        Category::Launchpad(CategoryKey::new("uxento"))
    }

    fn memory_registry(capacity: usize) -> (Arc<MemoryCache>, DedupRegistry) {
        let store = Arc::new(MemoryCache::new());
        let registry = DedupRegistry::new(TokenCache::new(store.clone(), capacity));
        (store, registry)
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn load(&self) -> PersistenceResult<Vec<CacheEntry>> {
            Err(PersistenceError::Unavailable("disk gone".into()))
        }
        fn store(&self, _: &[CacheEntry]) -> PersistenceResult<()> {
            Err(PersistenceError::Unavailable("disk gone".into()))
        }
        fn clear(&self) -> PersistenceResult<()> {
            Err(PersistenceError::Unavailable("disk gone".into()))
        }
    }

    #[test]
    fn test_try_accept_once() {
        let (_, registry) = memory_registry(10);
        assert!(registry.try_accept(&id("A"), &uxento()));
        assert!(!registry.try_accept(&id("A"), &uxento()));
        assert!(!registry.try_accept(&id("A"), &Category::Unclassified));

        let stats = registry.stats();
        assert_eq!(stats.total_detected, 1);
        assert_eq!(stats.per_category[&CategoryKey::new("uxento")], 1);
        assert_eq!(stats.other, 0);
    }

    #[test]
    fn test_unclassified_counts_other_bucket() {
        let (_, registry) = memory_registry(10);
        assert!(registry.try_accept(&id("B"), &Category::Unclassified));
        assert!(!registry.try_accept(&id("B"), &Category::Unclassified));

        let stats = registry.stats();
        assert_eq!(stats.other, 1);
        assert_eq!(stats.total_detected, 0);
        assert!(registry.known_entries().is_empty());
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (_, registry) = memory_registry(10);
        let entries = vec![
            CacheEntry::new(id("A"), CategoryKey::new("uxento")),
            CacheEntry::new(id("B"), CategoryKey::new("rapid")),
        ];
        assert_eq!(registry.seed(&entries, &default_categories()), 2);
        assert_eq!(registry.seed(&entries, &default_categories()), 0);

        let stats = registry.stats();
        assert_eq!(stats.total_detected, 2);
        assert_eq!(stats.per_category[&CategoryKey::new("rapid")], 1);
        assert!(!registry.try_accept(&id("B"), &uxento()));
    }

    #[test]
    fn test_seed_resolves_legacy_labels() {
        let (_, registry) = memory_registry(10);
        let entries = vec![
            CacheEntry::new(id("A"), CategoryKey::new("UXENTO")),
            CacheEntry::new(id("B"), CategoryKey::new("RAPIDLAUNCH")),
            CacheEntry::new(id("C"), CategoryKey::new("pumpfun")),
        ];
        assert_eq!(registry.seed(&entries, &default_categories()), 3);

        let stats = registry.stats();
        assert_eq!(stats.total_detected, 2);
        assert_eq!(stats.per_category[&CategoryKey::new("rapid")], 1);
        assert!(!stats.per_category.contains_key(&CategoryKey::new("rapidlaunch")));
        assert_eq!(stats.other, 1);
        assert_eq!(
            registry.known_entries(),
            vec![
                (id("A"), CategoryKey::new("uxento")),
                (id("B"), CategoryKey::new("rapid")),
            ]
        );
        assert!(!registry.try_accept(&id("C"), &uxento()));
    }

    #[test]
    fn test_accept_once_across_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token_cache.jsonl");
        let capacity = 5;

        {
            let registry = DedupRegistry::open(
                TokenCache::new(Arc::new(JsonLinesCache::new(&path)), capacity),
                &default_categories(),
            );
            for i in 0..8 {
                let ident = id(&format!("tok{i}"));
                assert!(registry.try_accept(&ident, &uxento()));
                assert!(registry.persist(&ident, &CategoryKey::new("uxento")));
            }
        }

        let restarted = DedupRegistry::open(
            TokenCache::new(Arc::new(JsonLinesCache::new(&path)), capacity),
            &default_categories(),
        );
        assert_eq!(restarted.stats().total_detected, 5);
        for i in 3..8 {
            assert!(!restarted.try_accept(&id(&format!("tok{i}")), &uxento()));
        }
        // Evicted from the bounded log, so it is new again after restart.
        assert!(restarted.try_accept(&id("tok0"), &uxento()));
    }

    #[test]
    fn test_persist_respects_capacity() {
        let (store, registry) = memory_registry(3);
        for i in 0..7 {
            let ident = id(&format!("t{i}"));
            registry.try_accept(&ident, &uxento());
            registry.persist(&ident, &CategoryKey::new("uxento"));
        }
        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].identifier.as_str(), "t4");
        assert_eq!(entries[2].identifier.as_str(), "t6");
    }

    #[test]
    fn test_reset_matches_cold_start() {
        let (store, registry) = memory_registry(10);
        registry.try_accept(&id("A"), &uxento());
        registry.persist(&id("A"), &CategoryKey::new("uxento"));
        registry.try_accept(&id("B"), &Category::Unclassified);

        registry.reset();

        assert_eq!(registry.stats(), RegistryStats::default());
        assert!(registry.known_entries().is_empty());
        assert!(store.is_empty());
        assert!(registry.try_accept(&id("A"), &uxento()));
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let registry = DedupRegistry::open(
            TokenCache::new(Arc::new(BrokenStore), 10),
            &default_categories(),
        );
        assert!(registry.try_accept(&id("A"), &uxento()));
        assert!(!registry.persist(&id("A"), &CategoryKey::new("uxento")));
        registry.reset();
        assert!(!registry.contains(&id("A")));
    }

    #[test]
    fn test_known_entries_in_acceptance_order() {
        let (_, registry) = memory_registry(10);
        registry.try_accept(&id("Z"), &uxento());
        registry.try_accept(&id("Q"), &Category::Unclassified);
        registry.try_accept(&id("A"), &Category::Launchpad(CategoryKey::new("rapid")));

        let known: Vec<_> = registry
            .known_entries()
            .into_iter()
            .map(|(i, c)| format!("{i}:{c}"))
            .collect();
        assert_eq!(known, vec!["Z:uxento", "A:rapid"]);
    }
}
