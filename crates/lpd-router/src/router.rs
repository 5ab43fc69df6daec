//! Feed event router.

use crate::notify::{Notification, Notifier};
use crate::settings::CategorySettings;
use crate::sink::AnnotationSink;
use lpd_core::{AnnotationFact, Category, RawFeedEvent};
use lpd_registry::DedupRegistry;
use lpd_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, info};

/// What happened to one feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Missing platform label.
    Malformed,
    /// Identifier already handled.
    Duplicate,
    /// New identifier, no configured category matched. Counted only.
    Unclassified,
    /// New fact for a disabled category. Counted and persisted only.
    Suppressed(AnnotationFact),
    /// New fact delivered to pages (and notified when enabled).
    Published(AnnotationFact),
}

impl RouteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Duplicate => "duplicate",
            Self::Unclassified => "unclassified",
            Self::Suppressed(_) => "suppressed",
            Self::Published(_) => "published",
        }
    }

    pub fn fact(&self) -> Option<&AnnotationFact> {
        match self {
            Self::Suppressed(fact) | Self::Published(fact) => Some(fact),
            _ => None,
        }
    }
}

/// Classifies, deduplicates and fans out feed events.
pub struct EventRouter {
    settings: Arc<CategorySettings>,
    registry: Arc<DedupRegistry>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn AnnotationSink>,
}

impl EventRouter {
    pub fn new(
        settings: Arc<CategorySettings>,
        registry: Arc<DedupRegistry>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn AnnotationSink>,
    ) -> Self {
        Self {
            settings,
            registry,
            notifier,
            sink,
        }
    }

    pub fn handle(&self, event: &RawFeedEvent) -> RouteOutcome {
        let outcome = self.route(event);
        Metrics::feed_event(outcome.as_str());
        outcome
    }

    fn route(&self, event: &RawFeedEvent) -> RouteOutcome {
        if event.platform_label.trim().is_empty() {
            debug!(identifier = %event.identifier, "Dropping event without platform label");
            return RouteOutcome::Malformed;
        }

        let def = self.settings.classify_def(&event.platform_label);
        let category = def
            .as_ref()
            .map_or(Category::Unclassified, |def| Category::Launchpad(def.key.clone()));
        if !self.registry.try_accept(&event.identifier, &category) {
            return RouteOutcome::Duplicate;
        }

        let Some(def) = def else {
            debug!(
                identifier = %event.identifier,
                label = %event.platform_label,
                "Unclassified token"
            );
            return RouteOutcome::Unclassified;
        };

        let fact = AnnotationFact::new(event.identifier.clone(), def.key, def.label, def.color);
        if !self.registry.persist(fact.identifier(), fact.category()) {
            Metrics::cache_write_failed();
        }

        if !def.enabled {
            debug!(identifier = %fact.identifier(), category = %fact.category(), "Category disabled");
            return RouteOutcome::Suppressed(fact);
        }

        info!(
            identifier = %fact.identifier(),
            category = %fact.category(),
            name = event.display_name_or_unknown(),
            "New token detected"
        );

        if self.settings.notifications_enabled() {
            self.notifier.notify(Notification::token_detected(
                &fact,
                event.display_name_or_unknown(),
            ));
        }
        self.sink.publish(&fact);
        Metrics::fact_published(fact.category().as_str());

        RouteOutcome::Published(fact)
    }
}
