//! Site profiles.
//!
//! Each supported site renders token rows differently. A profile names the
//! row fingerprint, the anchor element the marker hangs off, and how the
//! marker is built and placed.

use crate::dom::{Document, Element, NodeId};
use crate::error::{AnnotateError, AnnotateResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the marker goes relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPlacement {
    /// Next sibling of the anchor.
    AfterAnchor,
    /// Inside the anchor, as its second child (appended when it has none).
    AnchorSecondChild,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSpec {
    pub tag: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpec {
    pub tag: String,
    #[serde(default)]
    pub extra_classes: Vec<String>,
    pub placement: MarkerPlacement,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    /// Host substrings that select this profile.
    pub hosts: Vec<String>,
    /// Exact set of class tokens a row container must carry.
    pub row_classes: Vec<String>,
    pub anchor: AnchorSpec,
    pub marker: MarkerSpec,
}

impl SiteProfile {
    pub fn axiom() -> Self {
        Self {
            name: "axiom".to_string(),
            hosts: vec!["axiom.trade".to_string()],
            row_classes: classes(
                "flex flex-row w-full gap-[12px] pl-[12px] pr-[12px] sm:pr-[16px] \
                 pt-[12px] pb-[2px] justify-start items-center",
            ),
            anchor: AnchorSpec {
                tag: "span".to_string(),
                classes: classes("text-textPrimary text-[16px] font-medium tracking-[-0.02em] truncate"),
            },
            marker: MarkerSpec {
                tag: "span".to_string(),
                extra_classes: Vec::new(),
                placement: MarkerPlacement::AfterAnchor,
                styles: [
                    ("font-weight", "600"),
                    ("display", "inline"),
                    ("vertical-align", "baseline"),
                    ("margin-left", "4px"),
                    ("background", "transparent"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            },
        }
    }

    pub fn gmgn() -> Self {
        Self {
            name: "gmgn".to_string(),
            hosts: vec!["gmgn.ai".to_string()],
            row_classes: classes("relative flex overflow-hidden cursor-pointer"),
            anchor: AnchorSpec {
                tag: "div".to_string(),
                classes: classes(
                    "flex items-center min-w-0 overflow-hidden text-base gap-x-4px \
                     whitespace-nowrap leading-[20px] h-[20px]",
                ),
            },
            marker: MarkerSpec {
                tag: "div".to_string(),
                extra_classes: classes("whitespace-nowrap font-medium text-[16px] flex-shrink-0"),
                placement: MarkerPlacement::AnchorSecondChild,
                styles: BTreeMap::new(),
            },
        }
    }

    /// Pick the profile whose host list matches `host`.
    pub fn select<'a>(profiles: &'a [SiteProfile], host: &str) -> AnnotateResult<&'a SiteProfile> {
        profiles
            .iter()
            .find(|p| p.hosts.iter().any(|h| host.contains(h.as_str())))
            .ok_or_else(|| AnnotateError::UnknownSite(host.to_string()))
    }

    pub fn is_row(&self, element: &Element) -> bool {
        element.has_all_classes(&self.row_classes)
    }

    pub fn is_anchor(&self, element: &Element) -> bool {
        element.tag() == self.anchor.tag && element.has_all_classes(&self.anchor.classes)
    }

    /// Nearest ancestor-or-self row container of `node`.
    pub fn nearest_row(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        doc.closest(node, |e| self.is_row(e))
    }

    /// All connected row containers, in document order.
    pub fn rows(&self, doc: &Document) -> Vec<NodeId> {
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.get(n).is_some_and(|e| self.is_row(e)))
            .collect()
    }

    /// Whether `node` is a row or contains one.
    pub fn contains_row(&self, doc: &Document, node: NodeId) -> bool {
        doc.get(node).is_some_and(|e| self.is_row(e))
            || doc.find_descendant(node, |e| self.is_row(e)).is_some()
    }

    pub fn find_anchor(&self, doc: &Document, row: NodeId) -> Option<NodeId> {
        doc.find_descendant(row, |e| self.is_anchor(e))
    }
}

/// Profiles shipped with the detector.
pub fn builtin_profiles() -> Vec<SiteProfile> {
    vec![SiteProfile::axiom(), SiteProfile::gmgn()]
}

fn classes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_host() {
        let profiles = builtin_profiles();
        assert_eq!(SiteProfile::select(&profiles, "axiom.trade").unwrap().name, "axiom");
        assert_eq!(SiteProfile::select(&profiles, "www.gmgn.ai").unwrap().name, "gmgn");
        assert!(matches!(
            SiteProfile::select(&profiles, "example.com"),
            Err(AnnotateError::UnknownSite(_))
        ));
    }

    #[test]
    fn test_row_fingerprint_requires_every_class() {
        let profile = SiteProfile::gmgn();
        let mut doc = Document::new();
        let row = doc
            .append_element(doc.root(), "div", "relative flex overflow-hidden cursor-pointer h-10")
            .unwrap();
        let partial = doc
            .append_element(doc.root(), "div", "relative flex overflow-hidden")
            .unwrap();

        assert!(profile.is_row(doc.get(row).unwrap()));
        assert!(!profile.is_row(doc.get(partial).unwrap()));
        assert_eq!(profile.rows(&doc), vec![row]);
    }

    #[test]
    fn test_anchor_checks_tag() {
        let profile = SiteProfile::axiom();
        let mut doc = Document::new();
        let row = doc
            .append_element(doc.root(), "div", &profile.row_classes.join(" "))
            .unwrap();
        let wrong_tag = doc
            .append_element(row, "div", &profile.anchor.classes.join(" "))
            .unwrap();
        assert!(profile.find_anchor(&doc, row).is_none());

        let anchor = doc
            .append_element(wrong_tag, "span", &profile.anchor.classes.join(" "))
            .unwrap();
        assert_eq!(profile.find_anchor(&doc, row), Some(anchor));
    }

    #[test]
    fn test_profile_from_toml() {
        let raw = r##"
            name = "custom"
            hosts = ["example.org"]
            row_classes = ["row"]

            [anchor]
            tag = "span"
            classes = ["name"]

            [marker]
            tag = "span"
            placement = "after_anchor"

            [marker.styles]
            margin-left = "2px"
        "##;
        let profile: SiteProfile = toml::from_str(raw).unwrap();
        assert_eq!(profile.marker.placement, MarkerPlacement::AfterAnchor);
        assert!(profile.marker.extra_classes.is_empty());
        assert_eq!(profile.marker.styles["margin-left"], "2px");
    }
}
