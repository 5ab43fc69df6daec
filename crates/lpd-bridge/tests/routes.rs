//! Bridge route tests.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use futures_util::StreamExt;
use lpd_bridge::{create_router, run_broadcaster, AppState, BridgeConfig, BridgeState};
use lpd_core::{default_categories, AnnotationFact, Category, CategoryKey, ColorHex, Identifier};
use lpd_persistence::{MemoryCache, TokenCache};
use lpd_registry::DedupRegistry;
use lpd_router::{CategorySettings, Controller, LogNotifier};
use lpd_ws::PagePresence;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Harness {
    state: BridgeState,
    registry: Arc<DedupRegistry>,
    presence: Arc<PagePresence>,
    push_tx: broadcast::Sender<String>,
    _connected_tx: watch::Sender<bool>,
}

fn harness() -> Harness {
    let settings = Arc::new(CategorySettings::new(default_categories(), false).unwrap());
    let registry = Arc::new(DedupRegistry::new(TokenCache::new(
        Arc::new(MemoryCache::new()),
        300,
    )));
    let (connected_tx, connected_rx) = watch::channel(true);
    let controller = Arc::new(Controller::new(
        settings,
        registry.clone(),
        Arc::new(LogNotifier),
        connected_rx,
    ));
    let presence = Arc::new(PagePresence::with_default_sites().unwrap());
    let (push_tx, _) = broadcast::channel(16);
    Harness {
        state: BridgeState::new(controller, presence.clone(), push_tx.clone()),
        registry,
        presence,
        push_tx,
        _connected_tx: connected_tx,
    }
}

fn accept(registry: &DedupRegistry, id: &str, category: &str) {
    registry.try_accept(
        &Identifier::new(id).unwrap(),
        &Category::Launchpad(CategoryKey::new(category)),
    );
}

async fn call(h: &Harness, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = create_router(AppState::new(h.state.clone(), &BridgeConfig::default()));
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_stats_endpoint() {
    let h = harness();
    accept(&h.registry, "MintA", "uxento");
    h.registry
        .try_accept(&Identifier::new("MintB").unwrap(), &Category::Unclassified);

    let (status, body) = call(&h, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["totalDetected"], 1);
    assert_eq!(body["counts"]["uxento"], 1);
    assert_eq!(body["counts"]["rapid"], 0);
    assert_eq!(body["counts"]["other"], 1);
}

#[tokio::test]
async fn test_control_reset_and_errors() {
    let h = harness();
    accept(&h.registry, "MintA", "uxento");

    let (status, body) = call(&h, Method::POST, "/api/control", Some(json!({"type": "RESET"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "OK");
    assert_eq!(h.registry.stats().total_detected, 0);

    let (status, body) = call(
        &h,
        Method::POST,
        "/api/control",
        Some(json!({"type": "SET_CATEGORY_ENABLED", "category": "pump", "enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "ERROR");
}

#[tokio::test]
async fn test_invalid_color_rejected() {
    let h = harness();
    let (status, _) = call(
        &h,
        Method::POST,
        "/api/control",
        Some(json!({"type": "SET_CATEGORY_COLOR", "category": "rapid", "color": "blue"})),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_known_annotations_endpoint() {
    let h = harness();
    accept(&h.registry, "MintA", "rapid");

    let (status, body) = call(&h, Method::GET, "/api/annotations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "KNOWN_ANNOTATIONS");
    assert_eq!(body["annotations"][0]["identifier"], "MintA");
    assert_eq!(body["annotations"][0]["label"], "RAPIDLAUNCH");
}

#[tokio::test]
async fn test_page_presence_drives_interest() {
    let h = harness();
    let mut interest = h.presence.subscribe();

    let (_, body) = call(
        &h,
        Method::PUT,
        "/api/pages/tab-1",
        Some(json!({"url": "https://axiom.trade/pulse"})),
    )
    .await;
    assert_eq!(body["qualifies"], true);
    assert_eq!(body["interested"], true);
    assert!(interest.has_changed().unwrap());
    assert!(*interest.borrow_and_update());

    let (_, body) = call(
        &h,
        Method::PUT,
        "/api/pages/tab-2",
        Some(json!({"url": "https://example.com/"})),
    )
    .await;
    assert_eq!(body["qualifies"], false);
    assert_eq!(body["pages"], 2);

    let (_, body) = call(&h, Method::DELETE, "/api/pages/tab-1", None).await;
    assert_eq!(body["interested"], false);
    assert!(!*interest.borrow_and_update());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness();
    let app = create_router(AppState::new(h.state.clone(), &BridgeConfig::default()));
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_page_socket_receives_known_then_pushed() {
    let h = harness();
    accept(&h.registry, "MintA", "uxento");

    let cancel = CancellationToken::new();
    let (fact_tx, fact_rx) = mpsc::channel(8);
    tokio::spawn(run_broadcaster(fact_rx, h.push_tx.clone(), cancel.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState::new(h.state.clone(), &BridgeConfig::default()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let first: Value =
        serde_json::from_str(socket.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
    assert_eq!(first["type"], "KNOWN_ANNOTATIONS");
    assert_eq!(first["annotations"][0]["identifier"], "MintA");

    fact_tx
        .send(AnnotationFact::new(
            Identifier::new("MintB").unwrap(),
            CategoryKey::new("rapid"),
            "RAPIDLAUNCH".to_string(),
            ColorHex::parse("#1e88e5").unwrap(),
        ))
        .await
        .unwrap();

    let pushed: Value =
        serde_json::from_str(socket.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
    assert_eq!(pushed["type"], "ANNOTATE");
    assert_eq!(pushed["identifier"], "MintB");

    cancel.cancel();
}
