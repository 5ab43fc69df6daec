//! Persisted replay cache for the launchpad detector.
//!
//! Records accepted sightings as a bounded, ordered log so a restarted
//! session does not re-announce identifiers it has already handled.
//! The cache is an optimization: callers treat every error as non-fatal.

pub mod error;
pub mod jsonl;
pub mod store;
pub mod token_cache;

pub use error::{PersistenceError, PersistenceResult};
pub use jsonl::JsonLinesCache;
pub use store::{CacheEntry, CacheStore, MemoryCache};
pub use token_cache::{AppendOutcome, TokenCache, DEFAULT_CAPACITY};
