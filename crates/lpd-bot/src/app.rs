//! Session host orchestration.
//!
//! Wires the components together:
//! - feed connection, gated by page presence
//! - event routing (classification, dedup, persistence, notification)
//! - control surface and page bridge

use crate::config::AppConfig;
use crate::error::AppResult;
use lpd_bridge::{run_broadcaster, run_server, BridgeState};
use lpd_core::{AnnotationFact, RawFeedEvent};
use lpd_persistence::{JsonLinesCache, TokenCache};
use lpd_registry::DedupRegistry;
use lpd_router::{CategorySettings, ChannelSink, Controller, EventRouter, LogNotifier, Notifier};
use lpd_telemetry::Metrics;
use lpd_ws::{ConnectionManager, PagePresence, ReconnectCause, ReconnectCounts};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often session stats are sampled for reconnect metrics.
const SESSION_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period for background tasks after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    manager: Arc<ConnectionManager>,
    presence: Arc<PagePresence>,
    router: EventRouter,
    bridge: BridgeState,
    event_rx: mpsc::Receiver<RawFeedEvent>,
    fact_rx: mpsc::Receiver<AnnotationFact>,
    push_tx: broadcast::Sender<String>,
    cancel: CancellationToken,
}

impl Application {
    /// Build every component. The registry is seeded from the cache here.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let settings = Arc::new(CategorySettings::new(
            config.categories.clone(),
            config.notifications_enabled,
        )?);

        let store = Arc::new(JsonLinesCache::new(&config.cache.path));
        let cache = TokenCache::new(store, config.cache.capacity);
        let registry = Arc::new(DedupRegistry::open(cache, &config.categories));

        let presence = Arc::new(PagePresence::new(&config.sites[..])?);

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let manager = Arc::new(ConnectionManager::new(config.connection_config(), event_tx));

        let (fact_tx, fact_rx) = mpsc::channel(config.bridge.push_buffer);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let router = EventRouter::new(
            Arc::clone(&settings),
            Arc::clone(&registry),
            Arc::clone(&notifier),
            Arc::new(ChannelSink::new(fact_tx)),
        );

        let controller = Arc::new(Controller::new(
            settings,
            registry,
            notifier,
            manager.subscribe_connected(),
        ));
        let (push_tx, _) = broadcast::channel(config.bridge.push_buffer);
        let bridge = BridgeState::new(controller, Arc::clone(&presence), push_tx.clone());

        Ok(Self {
            config,
            manager,
            presence,
            router,
            bridge,
            event_rx,
            fact_rx,
            push_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Handle used by the bridge and by embedding code.
    pub fn bridge(&self) -> BridgeState {
        self.bridge.clone()
    }

    /// Cancelling this token stops `run`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until ctrl-c or the shutdown token fires.
    pub async fn run(self) -> AppResult<()> {
        let Self {
            config,
            manager,
            presence,
            router,
            bridge,
            mut event_rx,
            fact_rx,
            push_tx,
            cancel,
        } = self;

        info!(url = %config.ws_url, sites = ?config.sites, "Starting session host");

        let ws_manager = Arc::clone(&manager);
        let ws_interest = presence.subscribe();
        let ws_handle = tokio::spawn(async move {
            if let Err(e) = ws_manager.run(ws_interest).await {
                error!(?e, "Feed connection stopped");
            }
        });

        let broadcaster_handle = tokio::spawn(run_broadcaster(fact_rx, push_tx, cancel.clone()));

        let server_handle = if config.bridge.enabled {
            let server_bridge = bridge.clone();
            let server_config = config.bridge.clone();
            let server_cancel = cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = run_server(server_bridge, server_config, server_cancel.clone()).await {
                    error!(error = %e, "Page bridge failed");
                    server_cancel.cancel();
                }
            }))
        } else {
            info!("Page bridge disabled");
            None
        };

        for page in &config.initial_pages {
            let status = bridge.page_updated(&page.id, &page.url);
            debug!(page_id = %page.id, qualifies = status.qualifies, "Initial page registered");
        }

        let mut connected = manager.subscribe_connected();
        let mut interest = presence.subscribe();
        Metrics::interest_set(*interest.borrow_and_update());
        Metrics::ws_state_set(manager.state().as_str());

        let mut sample = tokio::time::interval(SESSION_SAMPLE_INTERVAL);
        let mut last_reconnects = ReconnectCounts::default();
        let mut routed = 0u64;

        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    routed += 1;
                    let outcome = router.handle(&event);
                    debug!(outcome = outcome.as_str(), "Feed event routed");
                }

                Ok(()) = connected.changed() => {
                    if *connected.borrow_and_update() {
                        Metrics::ws_connected();
                    } else {
                        Metrics::ws_disconnected();
                    }
                    Metrics::ws_state_set(manager.state().as_str());
                }

                Ok(()) = interest.changed() => {
                    let interested = *interest.borrow_and_update();
                    info!(interested, "Page interest changed");
                    Metrics::interest_set(interested);
                }

                _ = sample.tick() => {
                    let stats = manager.stats();
                    record_reconnects(&last_reconnects, &stats.reconnects);
                    last_reconnects = stats.reconnects;
                    Metrics::ws_state_set(stats.state.as_str());
                }

                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(routed, "Shutting down");
        cancel.cancel();
        manager.shutdown();

        if tokio::time::timeout(SHUTDOWN_GRACE, ws_handle).await.is_err() {
            warn!("Feed connection did not stop in time");
        }
        if let Err(e) = broadcaster_handle.await {
            warn!(?e, "Broadcaster task failed");
        }
        if let Some(handle) = server_handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Page bridge did not stop in time");
            }
        }

        Ok(())
    }
}

/// Export reconnects scheduled since `previous`, labelled by cause.
fn record_reconnects(previous: &ReconnectCounts, current: &ReconnectCounts) {
    for cause in ReconnectCause::ALL {
        let new = current.get(cause).saturating_sub(previous.get(cause));
        for _ in 0..new {
            Metrics::ws_reconnect(cause.as_str());
        }
    }
}
