//! WebSocket connection manager.
//!
//! Drives the pure `Session` state machine over a real socket: connection
//! attempts, the heartbeat interval and the reconnect timer are all arms of
//! one `select!` loop, so cancelling the loop tears down every timer at once.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{decode_frame, FeedFrame, PING_LITERAL};
use crate::session::{
    ReconnectCounts, ReconnectPolicy, Session, SessionCommand, SessionEvent, SessionState,
    SessionStats,
};
use futures_util::{SinkExt, StreamExt};
use lpd_core::RawFeedEvent;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = Pin<Box<dyn Future<Output = WsResult<FeedStream>> + Send>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Feed WebSocket URL.
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Interval between `ping` literals while open.
    pub heartbeat_interval_ms: u64,
    /// Upper bound for one connection attempt.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Resources owned by the running loop. Only one of `connecting` / `socket`
/// is ever set.
#[derive(Default)]
struct Link {
    connecting: Option<ConnectFuture>,
    socket: Option<FeedStream>,
    reconnect_at: Option<Instant>,
    heartbeat: Option<Interval>,
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<SessionState>,
    reconnect_count: RwLock<u32>,
    reconnects: RwLock<ReconnectCounts>,
    heartbeat: HeartbeatManager,
    event_tx: mpsc::Sender<RawFeedEvent>,
    connected_tx: watch::Sender<bool>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager delivering decoded events to `event_tx`.
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<RawFeedEvent>) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            heartbeat: HeartbeatManager::new(config.heartbeat_interval_ms),
            config,
            state: RwLock::new(SessionState::Idle),
            reconnect_count: RwLock::new(0),
            reconnects: RwLock::new(ReconnectCounts::default()),
            event_tx,
            connected_tx,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Connected/disconnected notifications.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            connected: self.is_connected(),
            reconnect_attempts: *self.reconnect_count.read(),
            reconnects: *self.reconnects.read(),
            last_activity: self.heartbeat.last_activity(),
        }
    }

    /// Signal graceful shutdown. `run` closes the socket and returns.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run the session until shutdown, following `interest`.
    pub async fn run(&self, mut interest: watch::Receiver<bool>) -> WsResult<()> {
        let mut session = Session::new(self.config.reconnect.clone());
        let mut link = Link::default();
        let mut pending = VecDeque::new();
        let mut interest_open = true;

        pending.push_back(SessionEvent::InterestChanged(*interest.borrow_and_update()));

        loop {
            while let Some(event) = pending.pop_front() {
                let commands = session.handle(event);
                *self.state.write() = session.state();
                *self.reconnect_count.write() = session.attempts();
                *self.reconnects.write() = session.reconnects();
                for command in commands {
                    self.execute(command, &mut link, &mut pending).await;
                }
            }

            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in session loop");
                    if let Some(mut socket) = link.socket.take() {
                        if let Err(e) = socket.close(None).await {
                            debug!(error = %e, "Failed to send Close frame during shutdown");
                        }
                    }
                    *self.state.write() = SessionState::Idle;
                    self.connected_tx.send_replace(false);
                    return Ok(());
                }

                changed = interest.changed(), if interest_open => {
                    let interested = match changed {
                        Ok(()) => *interest.borrow_and_update(),
                        Err(_) => {
                            debug!("Presence channel closed, treating as not interested");
                            interest_open = false;
                            false
                        }
                    };
                    pending.push_back(SessionEvent::InterestChanged(interested));
                }

                result = connect_attempt(&mut link.connecting) => {
                    link.connecting = None;
                    match result {
                        Ok(socket) => {
                            info!(url = %self.config.url, "WebSocket connected");
                            link.socket = Some(socket);
                            pending.push_back(SessionEvent::ConnectSucceeded);
                        }
                        Err(e) => {
                            warn!(url = %self.config.url, error = %e, "WebSocket connect failed");
                            pending.push_back(SessionEvent::ConnectFailed);
                        }
                    }
                }

                frame = next_frame(&mut link.socket) => {
                    if let Some(event) = self.handle_frame(frame, &mut link).await {
                        pending.push_back(event);
                    }
                }

                () = heartbeat_tick(&mut link.heartbeat) => {
                    pending.push_back(SessionEvent::HeartbeatDue {
                        transport_open: link.socket.is_some(),
                    });
                }

                () = reconnect_timer(link.reconnect_at) => {
                    link.reconnect_at = None;
                    pending.push_back(SessionEvent::ReconnectDelayElapsed);
                }
            }
        }
    }

    async fn execute(
        &self,
        command: SessionCommand,
        link: &mut Link,
        pending: &mut VecDeque<SessionEvent>,
    ) {
        match command {
            SessionCommand::Connect => {
                info!(url = %self.config.url, "Connecting to WebSocket");
                let url = self.config.url.clone();
                let timeout = Duration::from_millis(self.config.connect_timeout_ms);
                link.connecting = Some(Box::pin(open_socket(url, timeout)));
            }
            SessionCommand::Close { code, reason } => {
                link.connecting = None;
                if let Some(mut socket) = link.socket.take() {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if let Err(e) = socket.close(Some(frame)).await {
                        debug!(error = %e, "Failed to send Close frame");
                    }
                    info!(code, reason, "WebSocket closed");
                }
            }
            SessionCommand::StartHeartbeat => {
                self.heartbeat.reset();
                let period = self.heartbeat.interval();
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                link.heartbeat = Some(interval);
            }
            SessionCommand::StopHeartbeat => {
                link.heartbeat = None;
            }
            SessionCommand::SendPing => {
                let Some(socket) = link.socket.as_mut() else {
                    pending.push_back(SessionEvent::TransportError);
                    return;
                };
                match socket.send(Message::Text(PING_LITERAL.to_string())).await {
                    Ok(()) => self.heartbeat.record_ping(),
                    Err(e) => {
                        warn!(error = %e, "Heartbeat send failed");
                        pending.push_back(SessionEvent::TransportError);
                    }
                }
            }
            SessionCommand::ScheduleReconnect(delay) => {
                link.socket = None;
                link.connecting = None;
                link.reconnect_at = Some(Instant::now() + delay);
                warn!(
                    attempt = *self.reconnect_count.read(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting"
                );
            }
            SessionCommand::CancelReconnect => {
                link.reconnect_at = None;
                debug!("Reconnect cancelled");
            }
            SessionCommand::NotifyConnected => {
                self.connected_tx.send_replace(true);
            }
            SessionCommand::NotifyDisconnected => {
                self.connected_tx.send_replace(false);
            }
        }
    }

    async fn handle_frame(
        &self,
        frame: Option<Result<Message, tungstenite::Error>>,
        link: &mut Link,
    ) -> Option<SessionEvent> {
        match frame {
            Some(Ok(Message::Text(text))) => {
                self.heartbeat.record_message();
                self.dispatch_text(&text).await;
                None
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let socket = link.socket.as_mut()?;
                match socket.send(Message::Pong(data)).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(error = %e, "Failed to answer ping");
                        link.socket = None;
                        Some(SessionEvent::TransportError)
                    }
                }
            }
            Some(Ok(Message::Pong(_))) => {
                self.heartbeat.record_pong();
                None
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                warn!(code, %reason, "WebSocket closed by server");
                link.socket = None;
                Some(SessionEvent::TransportClosed)
            }
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read error");
                link.socket = None;
                Some(SessionEvent::TransportError)
            }
            None => {
                warn!("WebSocket stream ended");
                link.socket = None;
                Some(SessionEvent::TransportClosed)
            }
        }
    }

    async fn dispatch_text(&self, text: &str) {
        match decode_frame(text) {
            FeedFrame::Pong => self.heartbeat.record_pong(),
            FeedFrame::Events { events, .. } => {
                for event in events {
                    if self.event_tx.send(event).await.is_err() {
                        warn!("Event receiver dropped");
                        return;
                    }
                }
            }
            FeedFrame::Ignored => {}
        }
    }
}

async fn open_socket(url: String, timeout: Duration) -> WsResult<FeedStream> {
    match tokio::time::timeout(
        timeout,
        connect_async_tls_with_config(url.as_str(), None, true, None),
    )
    .await
    {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(WsError::ConnectTimeout(timeout.as_millis() as u64)),
    }
}

async fn connect_attempt(connecting: &mut Option<ConnectFuture>) -> WsResult<FeedStream> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<FeedStream>) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn heartbeat_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.reconnect.delay(3), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_idle_until_interested() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let manager = std::sync::Arc::new(ConnectionManager::new(
            ConnectionConfig {
                url: "ws://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            event_tx,
        ));
        let (_interest_tx, interest_rx) = watch::channel(false);

        let runner = manager.clone();
        let handle = tokio::spawn(async move { runner.run(interest_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(!manager.is_connected());

        manager.shutdown();
        handle.await.unwrap().unwrap();
    }
}
