//! Push-feed WebSocket client for the launchpad detector.
//!
//! Provides:
//! - A pure session state machine (`Session`) gated on page presence
//! - An async `ConnectionManager` that drives it over tokio-tungstenite
//! - Fixed-interval `ping` heartbeat and configurable reconnect backoff
//! - Frame decoding for the feed's event batches
//! - `PagePresence`, which turns open pages into the "interested" signal

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod presence;
pub mod session;

pub use connection::{ConnectionConfig, ConnectionManager};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use message::{decode_frame, FeedFrame, PING_LITERAL, PONG_LITERAL};
pub use presence::{PagePresence, SitePattern, DEFAULT_SITE_PATTERNS};
pub use session::{
    ReconnectCause, ReconnectCounts, ReconnectPolicy, Session, SessionCommand, SessionEvent,
    SessionState, SessionStats,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
