//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] lpd_ws::WsError),

    #[error("Router error: {0}")]
    Router(#[from] lpd_router::RouterError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] lpd_bridge::BridgeError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] lpd_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] lpd_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
