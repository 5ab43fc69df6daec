//! Presence-gated session state machine.
//!
//! `Session` is pure: it consumes `SessionEvent`s and returns the
//! `SessionCommand`s the driver must execute. It owns no sockets or timers,
//! which keeps every transition testable without I/O.
//!
//! ```text
//! IDLE --interest--> CONNECTING --ok--> OPEN
//!                        |                |  error / close / heartbeat on dead transport
//!                        | fail           v
//!                        +---------> RECONNECT_WAIT --delay--> CONNECTING
//! any --interest lost--> IDLE (close 1000, timers cancelled)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Normal closure code sent when interest is lost.
pub const NORMAL_CLOSE_CODE: u16 = 1000;
/// Close reason sent when no qualifying page is open.
pub const SITES_CLOSED_REASON: &str = "sites closed";

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    ReconnectWait,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectWait => "reconnect_wait",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Recomputed "interested" value (may repeat the current value).
    InterestChanged(bool),
    ConnectSucceeded,
    ConnectFailed,
    /// Read/write error on an open transport (including failed pings).
    TransportError,
    /// Peer closed or the stream ended.
    TransportClosed,
    /// Heartbeat interval elapsed.
    HeartbeatDue { transport_open: bool },
    ReconnectDelayElapsed,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a connection attempt.
    Connect,
    /// Abort any in-flight attempt and close the socket if one exists.
    Close { code: u16, reason: &'static str },
    StartHeartbeat,
    StopHeartbeat,
    SendPing,
    /// Drop the transport and arm the reconnect timer.
    ScheduleReconnect(Duration),
    CancelReconnect,
    NotifyConnected,
    NotifyDisconnected,
}

/// Reconnect delay policy.
///
/// The default is a fixed 5 s delay. Setting `multiplier > 1` gives
/// exponential growth capped at `max_delay_ms`; `jitter_ms` adds up to that
/// many random milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_ms: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay, no growth, no jitter.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter_ms: 0,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let grown = self.base_delay_ms as f64 * multiplier.powi(exponent);
        let capped = if multiplier > 1.0 {
            grown.min(self.max_delay_ms.max(self.base_delay_ms) as f64)
        } else {
            grown
        };

        let jitter = if self.jitter_ms > 0 {
            rand_jitter() % (self.jitter_ms + 1)
        } else {
            0
        };
        Duration::from_millis(capped as u64 + jitter)
    }
}

/// Generate random jitter from the clock's sub-second nanos.
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0)
}

/// Why the session went to `ReconnectWait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectCause {
    /// The attempt failed before the socket opened.
    ConnectFailed,
    /// Read or write error on the open socket.
    Error,
    /// The server closed, or the stream ended.
    Closed,
    /// A heartbeat found the transport gone.
    Heartbeat,
}

impl ReconnectCause {
    pub const ALL: [Self; 4] = [Self::ConnectFailed, Self::Error, Self::Closed, Self::Heartbeat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectFailed => "connect_failed",
            Self::Error => "error",
            Self::Closed => "close",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Scheduled reconnects since start, per cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconnectCounts {
    pub connect_failed: u64,
    pub error: u64,
    pub closed: u64,
    pub heartbeat: u64,
}

impl ReconnectCounts {
    pub fn get(&self, cause: ReconnectCause) -> u64 {
        match cause {
            ReconnectCause::ConnectFailed => self.connect_failed,
            ReconnectCause::Error => self.error,
            ReconnectCause::Closed => self.closed,
            ReconnectCause::Heartbeat => self.heartbeat,
        }
    }

    pub fn total(&self) -> u64 {
        ReconnectCause::ALL.iter().map(|&cause| self.get(cause)).sum()
    }

    fn record(&mut self, cause: ReconnectCause) {
        let slot = match cause {
            ReconnectCause::ConnectFailed => &mut self.connect_failed,
            ReconnectCause::Error => &mut self.error,
            ReconnectCause::Closed => &mut self.closed,
            ReconnectCause::Heartbeat => &mut self.heartbeat,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Observable session snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub connected: bool,
    /// Consecutive failed attempts since the last successful open.
    pub reconnect_attempts: u32,
    pub reconnects: ReconnectCounts,
    pub last_activity: Option<DateTime<Utc>>,
}

/// The session state machine.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    interested: bool,
    /// Consecutive failed attempts since the last successful open.
    attempts: u32,
    reconnects: ReconnectCounts,
    policy: ReconnectPolicy,
}

impl Session {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SessionState::Idle,
            interested: false,
            attempts: 0,
            reconnects: ReconnectCounts::default(),
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_interested(&self) -> bool {
        self.interested
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reconnects(&self) -> ReconnectCounts {
        self.reconnects
    }

    /// Apply one event and return the commands to execute, in order.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionCommand> {
        use SessionCommand as C;
        use SessionState as S;

        match (self.state, event) {
            (_, SessionEvent::InterestChanged(interested)) => {
                if interested == self.interested {
                    return Vec::new();
                }
                self.interested = interested;
                if interested {
                    match self.state {
                        S::Idle => {
                            self.state = S::Connecting;
                            vec![C::Connect]
                        }
                        _ => Vec::new(),
                    }
                } else {
                    self.go_idle()
                }
            }

            (S::Connecting, SessionEvent::ConnectSucceeded) => {
                self.state = S::Open;
                self.attempts = 0;
                vec![C::StartHeartbeat, C::NotifyConnected]
            }
            // A socket that opened after interest was lost.
            (_, SessionEvent::ConnectSucceeded) => vec![C::Close {
                code: NORMAL_CLOSE_CODE,
                reason: SITES_CLOSED_REASON,
            }],

            (S::Connecting, SessionEvent::ConnectFailed)
            | (S::Connecting, SessionEvent::TransportError)
            | (S::Connecting, SessionEvent::TransportClosed) => {
                self.schedule_reconnect(ReconnectCause::ConnectFailed)
            }

            (S::Open, SessionEvent::TransportError) => self.drop_open(ReconnectCause::Error),
            (S::Open, SessionEvent::TransportClosed) => self.drop_open(ReconnectCause::Closed),

            (S::Open, SessionEvent::HeartbeatDue { transport_open: true }) => vec![C::SendPing],
            (S::Open, SessionEvent::HeartbeatDue { transport_open: false }) => {
                self.drop_open(ReconnectCause::Heartbeat)
            }

            (S::ReconnectWait, SessionEvent::ReconnectDelayElapsed) => {
                if self.interested {
                    self.state = S::Connecting;
                    vec![C::Connect]
                } else {
                    self.state = S::Idle;
                    Vec::new()
                }
            }

            // Stale timer firings and events that do not apply to the state.
            _ => Vec::new(),
        }
    }

    fn drop_open(&mut self, cause: ReconnectCause) -> Vec<SessionCommand> {
        let mut commands = vec![SessionCommand::StopHeartbeat, SessionCommand::NotifyDisconnected];
        commands.extend(self.schedule_reconnect(cause));
        commands
    }

    fn schedule_reconnect(&mut self, cause: ReconnectCause) -> Vec<SessionCommand> {
        if !self.interested {
            return self.go_idle();
        }
        self.attempts = self.attempts.saturating_add(1);
        self.reconnects.record(cause);
        self.state = SessionState::ReconnectWait;
        vec![SessionCommand::ScheduleReconnect(
            self.policy.delay(self.attempts),
        )]
    }

    fn go_idle(&mut self) -> Vec<SessionCommand> {
        use SessionCommand as C;

        let previous = self.state;
        self.state = SessionState::Idle;
        self.attempts = 0;
        let close = C::Close {
            code: NORMAL_CLOSE_CODE,
            reason: SITES_CLOSED_REASON,
        };
        match previous {
            SessionState::Idle => Vec::new(),
            SessionState::Connecting => vec![close],
            SessionState::Open => vec![C::StopHeartbeat, close, C::NotifyDisconnected],
            SessionState::ReconnectWait => vec![C::CancelReconnect],
        }
    }
}
