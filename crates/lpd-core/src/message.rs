//! Cross-context and control-surface messages.
//!
//! All messages are JSON objects tagged by a `type` field, matching the
//! message vocabulary exchanged between the session context and page
//! contexts.

use crate::category::CategoryKey;
use crate::types::{AnnotationFact, ColorHex, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a page needs to render one marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationView {
    pub identifier: Identifier,
    pub label: String,
    pub color: ColorHex,
}

impl From<&AnnotationFact> for AnnotationView {
    fn from(fact: &AnnotationFact) -> Self {
        Self {
            identifier: fact.identifier().clone(),
            label: fact.label().to_string(),
            color: fact.color().clone(),
        }
    }
}

/// Session context -> page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// Push: a newly accepted fact.
    Annotate(AnnotationView),
    /// Pull response: everything the page may have missed before loading.
    KnownAnnotations { annotations: Vec<AnnotationView> },
}

/// Requests accepted by the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    GetStats,
    Reset,
    SetCategoryEnabled { category: CategoryKey, enabled: bool },
    SetCategoryColor { category: CategoryKey, color: ColorHex },
    SetNotificationsEnabled { enabled: bool },
    GetKnownAnnotations,
}

/// Responses of the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlResponse {
    Stats(StatsSnapshot),
    Ok,
    KnownAnnotations { annotations: Vec<AnnotationView> },
    Error { message: String },
}

/// `GET_STATS` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub connected: bool,
    pub total_detected: u64,
    /// Per-category counts, keyed by category key plus `other`.
    pub counts: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_annotate_wire_format() {
        let msg = PageMessage::Annotate(AnnotationView {
            identifier: Identifier::new("MINT123").unwrap(),
            label: "UXENTO".to_string(),
            color: ColorHex::parse("#ff0000").unwrap(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "ANNOTATE", "identifier": "MINT123", "label": "UXENTO", "color": "#ff0000"})
        );
    }

    #[test]
    fn test_control_request_parse() {
        let req: ControlRequest = serde_json::from_value(json!({
            "type": "SET_CATEGORY_COLOR",
            "category": "Uxento",
            "color": "#00FF00"
        }))
        .unwrap();
        assert_eq!(
            req,
            ControlRequest::SetCategoryColor {
                category: CategoryKey::new("uxento"),
                color: ColorHex::parse("#00ff00").unwrap(),
            }
        );

        let reset: ControlRequest = serde_json::from_value(json!({"type": "RESET"})).unwrap();
        assert_eq!(reset, ControlRequest::Reset);
    }

    #[test]
    fn test_control_request_rejects_bad_color() {
        let parsed: Result<ControlRequest, _> = serde_json::from_value(json!({
            "type": "SET_CATEGORY_COLOR",
            "category": "uxento",
            "color": "blue"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_stats_wire_format() {
        let mut counts = BTreeMap::new();
        counts.insert("uxento".to_string(), 2);
        counts.insert("other".to_string(), 1);
        let resp = ControlResponse::Stats(StatsSnapshot {
            connected: true,
            total_detected: 2,
            counts,
        });
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "STATS");
        assert_eq!(value["totalDetected"], 2);
        assert_eq!(value["counts"]["other"], 1);
    }
}
