//! Marker rendering.

use crate::dom::{Document, NodeId};
use crate::error::AnnotateResult;
use crate::profile::{MarkerPlacement, SiteProfile};
use lpd_core::{AnnotationView, ColorHex};

/// Class carried by every marker node.
pub const MARKER_CLASS: &str = "launchpad-detector-label";

/// What a marker shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerConfig {
    pub label: String,
    pub color: ColorHex,
}

impl From<&AnnotationView> for MarkerConfig {
    fn from(view: &AnnotationView) -> Self {
        Self {
            label: view.label.clone(),
            color: view.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOutcome {
    Created(NodeId),
    Updated(NodeId),
    Unchanged(NodeId),
    /// Row found but its anchor has not rendered yet.
    AnchorMissing,
}

impl MarkerOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::AnchorMissing)
    }
}

/// Existing marker inside `row`, if any.
pub fn find_marker(doc: &Document, row: NodeId) -> Option<NodeId> {
    doc.find_descendant(row, |e| e.has_class(MARKER_CLASS))
}

/// Ensure `row` carries exactly one marker matching `config`.
pub fn apply_marker(
    doc: &mut Document,
    profile: &SiteProfile,
    row: NodeId,
    config: &MarkerConfig,
) -> AnnotateResult<MarkerOutcome> {
    let Some(anchor) = profile.find_anchor(doc, row) else {
        return Ok(MarkerOutcome::AnchorMissing);
    };

    if let Some(marker) = find_marker(doc, row) {
        let element = doc.element(marker)?;
        if element.text() == config.label && element.style("color") == Some(config.color.as_str()) {
            return Ok(MarkerOutcome::Unchanged(marker));
        }
        doc.set_text(marker, &config.label)?;
        doc.set_style(marker, "color", config.color.as_str())?;
        return Ok(MarkerOutcome::Updated(marker));
    }

    let spec = &profile.marker;
    let marker = doc.create_element(&spec.tag);
    let mut class_name = MARKER_CLASS.to_string();
    for class in &spec.extra_classes {
        class_name.push(' ');
        class_name.push_str(class);
    }
    doc.set_class_name(marker, &class_name)?;
    for (property, value) in &spec.styles {
        doc.set_style(marker, property, value)?;
    }
    doc.set_text(marker, &config.label)?;
    doc.set_style(marker, "color", config.color.as_str())?;

    match spec.placement {
        MarkerPlacement::AfterAnchor => doc.insert_after(anchor, marker)?,
        MarkerPlacement::AnchorSecondChild => {
            let second = doc.element(anchor)?.children().get(1).copied();
            doc.insert_before(anchor, marker, second)?;
        }
    }
    Ok(MarkerOutcome::Created(marker))
}
