//! HTTP/WebSocket bridge implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use lpd_core::{ControlRequest, ControlResponse, PageMessage};
use lpd_telemetry::Metrics;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::state::{BridgeState, PageUpdate, PresenceStatus};

/// Bounds the number of concurrent page sockets.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot; the guard releases it on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                Metrics::bridge_clients(current + 1);
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = self.limiter.current.fetch_sub(1, Ordering::Release);
        Metrics::bridge_clients(previous.saturating_sub(1));
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    bridge: BridgeState,
    connection_limiter: Arc<ConnectionLimiter>,
}

impl AppState {
    pub fn new(bridge: BridgeState, config: &BridgeConfig) -> Self {
        Self {
            bridge,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/annotations", get(get_annotations))
        .route("/api/control", post(post_control))
        .route("/api/pages/{page_id}", put(put_page).delete(delete_page))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(get_metrics))
        .layer(cors)
        .with_state(state)
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.stats())
}

async fn get_annotations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.control(ControlRequest::GetKnownAnnotations))
}

async fn post_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Response {
    let response = state.bridge.control(request);
    let status = match response {
        ControlResponse::Error { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    (status, Json(response)).into_response()
}

async fn put_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(update): Json<PageUpdate>,
) -> Json<PresenceStatus> {
    Json(state.bridge.page_updated(&page_id, &update.url))
}

async fn delete_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> Json<PresenceStatus> {
    Json(state.bridge.page_closed(&page_id))
}

async fn get_metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            "Page socket limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New page socket"
    );

    ws.on_upgrade(move |socket| async move {
        let _guard = guard;
        handle_page_socket(socket, state.bridge).await;
    })
}

/// Known annotations first, then one `ANNOTATE` per published fact.
async fn handle_page_socket(socket: WebSocket, bridge: BridgeState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before snapshotting so no fact falls between the two.
    let mut push_rx = bridge.subscribe();

    match known_annotations_message(&bridge) {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("Failed to send known annotations, page disconnected");
                return;
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize known annotations"),
    }

    loop {
        tokio::select! {
            result = push_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to push annotation, page disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Page socket lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Push channel closed");
                        break;
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ControlRequest>(text.as_str()) {
                            Ok(ControlRequest::GetKnownAnnotations) => known_annotations_message(&bridge),
                            Ok(request) => serde_json::to_string(&bridge.control(request)).map_err(BridgeError::from),
                            Err(e) => {
                                debug!(error = %e, "Ignoring unrecognized page message");
                                continue;
                            }
                        };
                        match reply {
                            Ok(json) => {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Failed to serialize reply"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Page socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Page socket receive error");
                        break;
                    }
                }
            }
        }
    }
}

fn known_annotations_message(bridge: &BridgeState) -> BridgeResult<String> {
    let annotations = match bridge.control(ControlRequest::GetKnownAnnotations) {
        ControlResponse::KnownAnnotations { annotations } => annotations,
        _ => Vec::new(),
    };
    Ok(serde_json::to_string(&PageMessage::KnownAnnotations { annotations })?)
}

/// Serve the bridge until `cancel` fires.
pub async fn run_server(
    bridge: BridgeState,
    config: BridgeConfig,
    cancel: CancellationToken,
) -> BridgeResult<()> {
    let app = create_router(AppState::new(bridge, &config));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "Starting page bridge");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Page bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_releases_on_drop() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.current_count(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
