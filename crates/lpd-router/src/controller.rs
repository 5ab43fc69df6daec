//! Control surface.
//!
//! Answers `ControlRequest`s from the bridge: stats, reset, per-category
//! filter/color updates, the notification preference and the list of known
//! annotations a freshly loaded page needs.

use crate::notify::{Notification, Notifier};
use crate::settings::CategorySettings;
use lpd_core::{AnnotationView, ControlRequest, ControlResponse, StatsSnapshot};
use lpd_registry::DedupRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

const OTHER_BUCKET: &str = "other";

pub struct Controller {
    settings: Arc<CategorySettings>,
    registry: Arc<DedupRegistry>,
    notifier: Arc<dyn Notifier>,
    connected: watch::Receiver<bool>,
}

impl Controller {
    pub fn new(
        settings: Arc<CategorySettings>,
        registry: Arc<DedupRegistry>,
        notifier: Arc<dyn Notifier>,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            registry,
            notifier,
            connected,
        }
    }

    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::GetStats => ControlResponse::Stats(self.stats()),
            ControlRequest::Reset => {
                self.registry.reset();
                ControlResponse::Ok
            }
            ControlRequest::SetCategoryEnabled { category, enabled } => {
                match self.settings.set_enabled(&category, enabled) {
                    Ok(()) => ControlResponse::Ok,
                    Err(e) => error_response(e),
                }
            }
            ControlRequest::SetCategoryColor { category, color } => {
                match self.settings.set_color(&category, color) {
                    Ok(()) => ControlResponse::Ok,
                    Err(e) => error_response(e),
                }
            }
            ControlRequest::SetNotificationsEnabled { enabled } => {
                let previous = self.settings.set_notifications_enabled(enabled);
                info!(enabled, "Notifications preference updated");
                if enabled && !previous {
                    self.notifier
                        .notify(Notification::status("Notifications enabled"));
                }
                ControlResponse::Ok
            }
            ControlRequest::GetKnownAnnotations => ControlResponse::KnownAnnotations {
                annotations: self.known_annotations(),
            },
        }
    }

    /// Counters keyed by every configured category plus `other`.
    pub fn stats(&self) -> StatsSnapshot {
        let registry = self.registry.stats();
        let mut counts: std::collections::BTreeMap<String, u64> = self
            .settings
            .keys()
            .into_iter()
            .map(|key| (key.to_string(), 0))
            .collect();
        for (key, count) in registry.per_category {
            counts.insert(key.to_string(), count);
        }
        counts.insert(OTHER_BUCKET.to_string(), registry.other);

        StatsSnapshot {
            connected: *self.connected.borrow(),
            total_detected: registry.total_detected,
            counts,
        }
    }

    /// Known facts of enabled categories, oldest first, with current colors.
    pub fn known_annotations(&self) -> Vec<AnnotationView> {
        self.registry
            .known_entries()
            .into_iter()
            .filter_map(|(identifier, key)| {
                let def = self.settings.lookup(&key)?;
                def.enabled.then(|| AnnotationView {
                    identifier,
                    label: def.label,
                    color: def.color,
                })
            })
            .collect()
    }
}

fn error_response(error: impl std::fmt::Display) -> ControlResponse {
    ControlResponse::Error {
        message: error.to_string(),
    }
}
