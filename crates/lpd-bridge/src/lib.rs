//! lpd-bridge - Local HTTP/WebSocket bridge between the session and page contexts.
//!
//! Page hosts report presence and receive annotations through this crate:
//!
//! - REST control surface (`/api/stats`, `/api/annotations`, `/api/control`)
//! - Page presence (`PUT`/`DELETE /api/pages/{page_id}`) driving feed interest
//! - Push stream (`/ws`): `KNOWN_ANNOTATIONS` on connect, then `ANNOTATE` per fact
//! - Prometheus exposition (`/metrics`)
//!
//! # Usage
//!
//! ```ignore
//! use lpd_bridge::{run_broadcaster, run_server, BridgeConfig, BridgeState};
//!
//! let (push_tx, _) = tokio::sync::broadcast::channel(config.push_buffer);
//! tokio::spawn(run_broadcaster(fact_rx, push_tx.clone(), cancel.clone()));
//! let state = BridgeState::new(controller, presence, push_tx);
//! tokio::spawn(run_server(state, config, cancel));
//! ```

mod broadcast;
mod config;
mod error;
mod server;
mod state;

pub use broadcast::run_broadcaster;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use server::{create_router, run_server, AppState, ConnectionLimiter};
pub use state::{BridgeState, PageUpdate, PresenceStatus};
