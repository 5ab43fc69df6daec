//! Feed frame decoding.
//!
//! Inbound text frames are either the liveness literal `pong`, a JSON
//! object holding one event, or a JSON array of events. Two event shapes are
//! accepted:
//!
//! ```json
//! {"kind": "new_item", "identifier": "...", "platformLabel": "...", "displayName": "..."}
//! {"type": "new_token", "token": {"mint": "...", "launchpad": "...", "name": "..."}}
//! ```

use lpd_core::{Identifier, RawFeedEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Outbound liveness literal.
pub const PING_LITERAL: &str = "ping";
/// Inbound liveness literal.
pub const PONG_LITERAL: &str = "pong";

const FLAT_KIND: &str = "new_item";
const LEGACY_KIND: &str = "new_token";

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Reply to our `ping`.
    Pong,
    /// Events in frame order. `dropped` counts items that failed to decode.
    Events {
        events: Vec<RawFeedEvent>,
        dropped: usize,
    },
    /// Non-JSON text or a JSON value that is neither object nor array.
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEvent {
    Flat(FlatEvent),
    Legacy(LegacyEvent),
}

#[derive(Debug, Deserialize)]
struct FlatEvent {
    kind: String,
    identifier: String,
    #[serde(rename = "platformLabel")]
    platform_label: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    #[serde(rename = "type")]
    kind: String,
    token: LegacyToken,
}

#[derive(Debug, Deserialize)]
struct LegacyToken {
    mint: String,
    launchpad: String,
    #[serde(default)]
    name: Option<String>,
}

impl WireEvent {
    fn into_raw(self) -> Option<RawFeedEvent> {
        let (kind, identifier, platform_label, display_name) = match self {
            Self::Flat(e) => (e.kind, e.identifier, e.platform_label, e.display_name),
            Self::Legacy(e) => (e.kind, e.token.mint, e.token.launchpad, e.token.name),
        };
        if kind != FLAT_KIND && kind != LEGACY_KIND {
            return None;
        }
        Some(RawFeedEvent {
            identifier: Identifier::new(identifier).ok()?,
            platform_label,
            display_name,
        })
    }
}

fn decode_item(item: Value) -> Option<RawFeedEvent> {
    serde_json::from_value::<WireEvent>(item)
        .ok()
        .and_then(WireEvent::into_raw)
}

/// Decode one inbound text frame.
///
/// Malformed items inside a batch are dropped individually; their siblings
/// are still delivered in order.
pub fn decode_frame(text: &str) -> FeedFrame {
    let trimmed = text.trim();
    if trimmed == PONG_LITERAL {
        return FeedFrame::Pong;
    }

    let items = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        Ok(obj @ Value::Object(_)) => vec![obj],
        Ok(_) | Err(_) => {
            debug!(len = text.len(), "Ignoring non-event frame");
            return FeedFrame::Ignored;
        }
    };

    let total = items.len();
    let events: Vec<_> = items.into_iter().filter_map(decode_item).collect();
    let dropped = total - events.len();
    if dropped > 0 {
        debug!(dropped, total, "Dropped malformed feed items");
    }

    FeedFrame::Events { events, dropped }
}
