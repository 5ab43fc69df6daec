//! User notifications.

use chrono::Utc;
use lpd_core::AnnotationFact;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Normal,
    High,
}

/// A desktop-style notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
}

impl Notification {
    /// `<LABEL> token detected` with the name and shortened identifier.
    pub fn token_detected(fact: &AnnotationFact, display_name: &str) -> Self {
        Self {
            id: format!(
                "launchpad-{}-{}",
                fact.identifier(),
                Utc::now().timestamp_millis()
            ),
            title: format!("{} token detected", fact.label()),
            message: format!("{}\nMint: {}", display_name, fact.identifier().short()),
            priority: NotificationPriority::High,
        }
    }

    pub fn status(message: &str) -> Self {
        Self {
            id: format!("launchpad-status-{}", Utc::now().timestamp_millis()),
            title: "Launchpad Detector".to_string(),
            message: message.to_string(),
            priority: NotificationPriority::Normal,
        }
    }
}

/// Presents notifications to the user.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            id = %notification.id,
            title = %notification.title,
            message = %notification.message,
            "Notification"
        );
    }
}
