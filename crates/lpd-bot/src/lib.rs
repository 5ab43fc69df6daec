//! Launchpad detector session host.
//!
//! Main application that orchestrates the session context:
//! - Feed connection gated on page presence
//! - Classification, dedup and the persisted replay cache
//! - Notifications and annotation fan-out
//! - Page bridge (control surface, presence, push stream, metrics)

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
