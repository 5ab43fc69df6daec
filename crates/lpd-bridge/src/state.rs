//! Shared state behind the bridge handlers.

use lpd_core::{ControlRequest, ControlResponse, StatsSnapshot};
use lpd_router::Controller;
use lpd_ws::PagePresence;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Body of `PUT /api/pages/{page_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageUpdate {
    pub url: String,
}

/// Presence view returned by the page endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    /// Whether this page is on a supported site.
    pub qualifies: bool,
    /// Whether any open page is on a supported site.
    pub interested: bool,
    pub pages: usize,
}

/// Session-side handles the bridge exposes to page contexts.
#[derive(Clone)]
pub struct BridgeState {
    controller: Arc<Controller>,
    presence: Arc<PagePresence>,
    push_tx: broadcast::Sender<String>,
}

impl BridgeState {
    pub fn new(
        controller: Arc<Controller>,
        presence: Arc<PagePresence>,
        push_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            controller,
            presence,
            push_tx,
        }
    }

    pub fn control(&self, request: ControlRequest) -> ControlResponse {
        self.controller.handle(request)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.controller.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.push_tx.subscribe()
    }

    pub fn page_updated(&self, page_id: &str, url: &str) -> PresenceStatus {
        let qualifies = self.presence.page_updated(page_id, url);
        self.presence_status(qualifies)
    }

    pub fn page_closed(&self, page_id: &str) -> PresenceStatus {
        self.presence.page_closed(page_id);
        self.presence_status(false)
    }

    fn presence_status(&self, qualifies: bool) -> PresenceStatus {
        PresenceStatus {
            qualifies,
            interested: self.presence.is_interested(),
            pages: self.presence.page_count(),
        }
    }
}
