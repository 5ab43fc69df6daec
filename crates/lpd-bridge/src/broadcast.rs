//! Fan-out of published facts to page sockets.
//!
//! The router's sink feeds an mpsc channel; the broadcaster serializes each
//! fact once as an `ANNOTATE` message and hands it to every connected page.

use lpd_core::{AnnotationFact, AnnotationView, PageMessage};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Forward facts until the sink side closes or `cancel` fires.
pub async fn run_broadcaster(
    mut facts: mpsc::Receiver<AnnotationFact>,
    tx: broadcast::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let fact = tokio::select! {
            _ = cancel.cancelled() => break,
            fact = facts.recv() => match fact {
                Some(fact) => fact,
                None => break,
            },
        };

        let msg = PageMessage::Annotate(AnnotationView::from(&fact));
        match serde_json::to_string(&msg) {
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, identifier = %fact.identifier(), "Annotation pushed"),
                Err(_) => trace!("No page sockets connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize annotation"),
        }
    }
    debug!("Broadcaster stopped");
}
