//! Core domain types for the launchpad detector.
//!
//! This crate provides the vocabulary shared by the session and page contexts:
//! - `Identifier`: the dedup key of a detected token
//! - `Category` / `CategoryDef`: launch-platform classes, configured as data
//! - `Classifier`: pure label -> category mapping
//! - `AnnotationFact`: accepted, classified, immutable record ready for display
//! - Cross-context and control-surface message types

pub mod category;
pub mod classifier;
pub mod error;
pub mod message;
pub mod types;

pub use category::{default_categories, resolve_category, Category, CategoryDef, CategoryKey};
pub use classifier::Classifier;
pub use error::{CoreError, Result};
pub use message::{AnnotationView, ControlRequest, ControlResponse, PageMessage, StatsSnapshot};
pub use types::{AnnotationFact, ColorHex, Identifier, RawFeedEvent};
