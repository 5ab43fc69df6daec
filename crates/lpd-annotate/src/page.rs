//! Page context driver.
//!
//! Runs one `AnnotationEngine` against a shared document on tokio timers.
//! Everything the page owns (engine, timers, observed rows) goes away when
//! the event channel closes or the cancellation token fires.

use crate::config::EngineConfig;
use crate::dom::{Document, NodeId};
use crate::engine::{AnnotationEngine, EngineStats, LifecycleEvent};
use crate::profile::SiteProfile;
use lpd_core::{ControlRequest, PageMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inputs to a page context.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Message from the session context.
    Message(PageMessage),
    /// The page navigated or reloaded; state starts over.
    Reloaded,
    /// The document changed; pending mutation records are drained.
    DomChanged,
    /// Observed rows that entered the viewport.
    Intersection(Vec<NodeId>),
    Lifecycle(LifecycleEvent),
    Scroll,
}

impl From<PageMessage> for PageEvent {
    fn from(message: PageMessage) -> Self {
        Self::Message(message)
    }
}

pub struct PageContext {
    profile: SiteProfile,
    config: EngineConfig,
    engine: AnnotationEngine,
    document: Arc<Mutex<Document>>,
    events: mpsc::Receiver<PageEvent>,
    requests: mpsc::Sender<ControlRequest>,
    observer: Option<mpsc::UnboundedSender<Vec<NodeId>>>,
    cancel: CancellationToken,
}

impl PageContext {
    pub fn new(
        profile: SiteProfile,
        config: EngineConfig,
        document: Arc<Mutex<Document>>,
        events: mpsc::Receiver<PageEvent>,
        requests: mpsc::Sender<ControlRequest>,
        cancel: CancellationToken,
    ) -> Self {
        let engine = AnnotationEngine::new(profile.clone(), config.clone(), now());
        Self {
            profile,
            config,
            engine,
            document,
            events,
            requests,
            observer: None,
            cancel,
        }
    }

    /// Receive batches of rows to register with the intersection watcher.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<Vec<NodeId>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Drive the engine until cancelled or the event channel closes.
    pub async fn run(mut self) -> EngineStats {
        info!(site = %self.profile.name, "Page context started");
        self.request_known().await;

        loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Page context cancelled");
                    break;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("Page event channel closed");
                        break;
                    };
                    if self.handle(event) {
                        self.request_known().await;
                    }
                }

                _ = sleep_until(deadline) => {
                    let mut doc = self.document.lock();
                    self.engine.poll(&mut doc, now());
                }
            }
            self.after_step();
        }

        let stats = self.engine.stats();
        info!(
            site = %self.profile.name,
            scans = stats.scans,
            resolved = stats.resolved,
            exhausted = stats.exhausted,
            "Page context closed"
        );
        stats
    }

    /// Returns true when known annotations must be requested again.
    fn handle(&mut self, event: PageEvent) -> bool {
        let now = now();
        match event {
            PageEvent::Message(PageMessage::Annotate(view)) => {
                self.engine.annotate(&view, now);
            }
            PageEvent::Message(PageMessage::KnownAnnotations { annotations }) => {
                let mut doc = self.document.lock();
                self.engine.load_known(&mut doc, &annotations, now);
            }
            PageEvent::Reloaded => {
                self.document.lock().take_mutations();
                self.engine = AnnotationEngine::new(self.profile.clone(), self.config.clone(), now);
                return true;
            }
            PageEvent::DomChanged => {}
            PageEvent::Intersection(rows) => {
                let doc = self.document.lock();
                self.engine.on_intersection(&doc, &rows, now);
            }
            PageEvent::Lifecycle(event) => {
                let mut doc = self.document.lock();
                self.engine.on_lifecycle(&mut doc, event, now);
            }
            PageEvent::Scroll => self.engine.on_scroll(now),
        }
        false
    }

    fn after_step(&mut self) {
        {
            let mut doc = self.document.lock();
            let records = doc.take_mutations();
            if !records.is_empty() {
                self.engine.on_mutations(&doc, &records, now());
            }
        }

        let rows = self.engine.take_observe_requests();
        if rows.is_empty() {
            return;
        }
        if let Some(observer) = &self.observer {
            if observer.send(rows).is_err() {
                self.observer = None;
            }
        }
    }

    async fn request_known(&self) {
        if let Err(e) = self.requests.send(ControlRequest::GetKnownAnnotations).await {
            warn!(error = %e, "Failed to request known annotations");
        }
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
