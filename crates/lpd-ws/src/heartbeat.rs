//! Liveness tracking for the feed connection.
//!
//! The feed replies to `ping` with `pong` but nothing depends on the reply:
//! pings are sent on a fixed interval while the session is open and the
//! timestamps here only feed observability.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Heartbeat bookkeeping for one connection manager.
pub struct HeartbeatManager {
    /// How often to send `ping`.
    interval_ms: u64,
    last_ping: RwLock<Option<DateTime<Utc>>>,
    last_pong: RwLock<Option<DateTime<Utc>>>,
    /// Last inbound frame of any kind.
    last_message: RwLock<Option<DateTime<Utc>>>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            last_ping: RwLock::new(None),
            last_pong: RwLock::new(None),
            last_message: RwLock::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reset state (called when a connection opens).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_pong.write() = None;
        *self.last_message.write() = Some(Utc::now());
    }

    pub fn record_ping(&self) {
        let now = Utc::now();
        *self.last_ping.write() = Some(now);
        debug!(time = %now, "Sent ping");
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Some(Utc::now());
    }

    /// Most recent sign of life from the feed.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        let message = *self.last_message.read();
        let pong = *self.last_pong.read();
        message.max(pong)
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: *self.last_ping.read(),
            last_pong: *self.last_pong.read(),
            last_message: *self.last_message.read(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
}
