//! Prometheus metrics and structured logging for the launchpad detector.
//!
//! - Prometheus metrics for the feed session, routing outcomes and the bridge
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, DEFAULT_LOG_FILTER};
pub use metrics::Metrics;
