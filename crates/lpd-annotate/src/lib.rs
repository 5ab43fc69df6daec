//! Page-side annotation engine for the launchpad detector.
//!
//! Given annotation facts and a live, mutating document, finds the row
//! rendering each identifier and attaches a marker exactly once:
//! - `dom`: in-memory document model with mutation records
//! - `profile`: per-site row/anchor fingerprints and marker placement
//! - `locator`: attribute and structural target resolution
//! - `marker`: idempotent marker rendering
//! - `engine`: clock-injected resolution, retry and reactivity state machine
//! - `page`: async driver tying the engine to tokio timers

pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod locator;
pub mod marker;
pub mod page;
pub mod profile;

pub use config::EngineConfig;
pub use dom::{Document, Element, MutationRecord, NodeId};
pub use engine::{AnnotationEngine, EngineStats, LifecycleEvent};
pub use error::{AnnotateError, AnnotateResult};
pub use locator::{AttributeLocator, Locator, LocatorChain, RowIndex, StructuralLocator};
pub use marker::{apply_marker, MarkerConfig, MarkerOutcome, MARKER_CLASS};
pub use page::{PageContext, PageEvent};
pub use profile::{builtin_profiles, MarkerPlacement, SiteProfile};
