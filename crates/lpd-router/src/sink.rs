//! Delivery of accepted facts to page contexts.

use lpd_core::AnnotationFact;
use tokio::sync::mpsc;
use tracing::warn;

/// Receives facts to annotate. Fire-and-forget: delivery is never retried.
#[cfg_attr(test, mockall::automock)]
pub trait AnnotationSink: Send + Sync {
    fn publish(&self, fact: &AnnotationFact);
}

/// Forwards facts over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AnnotationFact>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AnnotationFact>) -> Self {
        Self { tx }
    }
}

impl AnnotationSink for ChannelSink {
    fn publish(&self, fact: &AnnotationFact) {
        if let Err(e) = self.tx.try_send(fact.clone()) {
            warn!(identifier = %fact.identifier(), error = %e, "Dropped annotation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpd_core::{CategoryKey, ColorHex, Identifier};

    fn fact(id: &str) -> AnnotationFact {
        AnnotationFact::new(
            Identifier::new(id).unwrap(),
            CategoryKey::new("rapid"),
            "RAPIDLAUNCH".to_string(),
            ColorHex::parse("#1e88e5").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);

        sink.publish(&fact("A"));
        sink.publish(&fact("B"));

        assert_eq!(rx.recv().await.unwrap().identifier().as_str(), "A");
        tokio_test::assert_err!(rx.try_recv());
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ChannelSink::new(tx).publish(&fact("A"));
    }
}
