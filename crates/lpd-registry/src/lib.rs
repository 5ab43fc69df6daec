//! Deduplication registry for the launchpad detector.
//!
//! Owns the set of identifiers accepted during the process lifetime and is
//! the single writer of the persisted replay cache.

pub mod dedup;

pub use dedup::{DedupRegistry, RegistryStats};
