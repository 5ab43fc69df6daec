//! Mock feed server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and count them, including how many are open at once
//! - Hold the WebSocket handshake for a fixed delay
//! - Push configured frames to every new connection
//! - Record received text frames and close codes
//! - Drop every open connection on demand

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct Recorded {
    /// TCP connections accepted, handshake or not.
    attempts: u32,
    connections: u32,
    open: u32,
    max_open: u32,
    messages: Vec<String>,
    close_codes: Vec<u16>,
}

/// A mock feed WebSocket server.
pub struct MockFeedServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    kick_tx: broadcast::Sender<()>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockFeedServer {
    /// Start a server that sends `greeting` frames to every connection.
    pub async fn start(greeting: Vec<String>) -> Self {
        Self::start_with_handshake_delay(greeting, Duration::ZERO).await
    }

    /// Like `start`, but each handshake is answered only after `delay`.
    pub async fn start_with_handshake_delay(greeting: Vec<String>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (kick_tx, _) = broadcast::channel::<()>(4);

        let recorded_clone = recorded.clone();
        let kick_clone = kick_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            greeting.clone(),
                            recorded_clone.clone(),
                            kick_clone.subscribe(),
                            delay,
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            kick_tx,
            recorded,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        self.recorded.lock().await.connections
    }

    pub async fn attempt_count(&self) -> u32 {
        self.recorded.lock().await.attempts
    }

    pub async fn open_count(&self) -> u32 {
        self.recorded.lock().await.open
    }

    /// Highest number of simultaneously open WebSocket connections.
    pub async fn max_open(&self) -> u32 {
        self.recorded.lock().await.max_open
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.recorded.lock().await.messages.clone()
    }

    pub async fn close_codes(&self) -> Vec<u16> {
        self.recorded.lock().await.close_codes.clone()
    }

    /// Abruptly drop every open connection.
    pub fn kick_all(&self) {
        let _ = self.kick_tx.send(());
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    greeting: Vec<String>,
    recorded: Arc<Mutex<Recorded>>,
    mut kick_rx: broadcast::Receiver<()>,
    delay: Duration,
) {
    recorded.lock().await.attempts += 1;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    {
        let mut recorded = recorded.lock().await;
        recorded.connections += 1;
        recorded.open += 1;
        recorded.max_open = recorded.max_open.max(recorded.open);
    }

    let (mut write, mut read) = ws_stream.split();
    for frame in greeting {
        let _ = write.send(Message::Text(frame)).await;
    }

    loop {
        tokio::select! {
            _ = kick_rx.recv() => break,
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    recorded.lock().await.messages.push(text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    recorded.lock().await.close_codes.push(code);
                    break;
                }
                Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
    recorded.lock().await.open -= 1;
}
