//! Feed event routing for the launchpad detector.
//!
//! Turns raw feed events into annotation facts:
//! classify, gate on the dedup registry, persist, notify, publish.
//! Also hosts the control surface used by the bridge.

pub mod controller;
pub mod error;
pub mod notify;
pub mod router;
pub mod settings;
pub mod sink;

pub use controller::Controller;
pub use error::{RouterError, RouterResult};
pub use notify::{LogNotifier, Notification, NotificationPriority, Notifier};
pub use router::{EventRouter, RouteOutcome};
pub use settings::CategorySettings;
pub use sink::{AnnotationSink, ChannelSink};
