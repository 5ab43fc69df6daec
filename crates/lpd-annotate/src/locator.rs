//! Target resolution.
//!
//! `RowIndex` maps identifiers to rows in one document pass and serves
//! every lookup of a scan. Locators find candidate elements for a single
//! identifier; the chain walks every candidate up to its row container and
//! stops at the first locator that produced at least one row.

use crate::dom::{Document, Element, NodeId};
use crate::profile::SiteProfile;
use lpd_core::Identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Identifier-carrying link shapes, tried in order.
static HREF_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/token/([a-zA-Z0-9]{32,})",
        r"[?&]address=([a-zA-Z0-9]{32,})",
        r"[?&]mint=([a-zA-Z0-9]{32,})",
        r"/([a-zA-Z0-9]{32,})$",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("valid href pattern"))
    .collect()
});

/// Identifier-shaped tokens in visible text.
static TEXT_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9]{32,}").expect("valid text pattern"));

const DATA_ATTRIBUTES: [&str; 3] = ["data-mint", "data-address", "data-token"];

/// Extract the identifier embedded in a link target.
pub fn identifier_from_href(href: &str) -> Option<&str> {
    HREF_PATTERNS.iter().find_map(|re| {
        re.captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    })
}

/// Identifiers carried by one element's link target or data attributes.
fn element_identifiers(element: &Element) -> impl Iterator<Item = &str> {
    let from_href = element.attribute("href").and_then(identifier_from_href);
    let from_data = DATA_ATTRIBUTES
        .iter()
        .filter_map(move |name| element.attribute(name))
        .map(str::trim)
        .filter(|value| !value.is_empty());
    from_href.into_iter().chain(from_data)
}

/// Identifier to rows, built from a single walk of the document.
///
/// An element belongs to its nearest row. Rows without any link or data
/// identifier fall back to identifier-shaped tokens in their text.
#[derive(Debug, Default)]
pub struct RowIndex {
    rows: HashMap<String, Vec<NodeId>>,
    identified: HashSet<NodeId>,
    row_count: usize,
}

impl RowIndex {
    pub fn build(doc: &Document, profile: &SiteProfile) -> Self {
        let mut order: Vec<(NodeId, Vec<String>)> = Vec::new();
        let mut slot: HashMap<NodeId, usize> = HashMap::new();

        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(doc.root(), None)];
        while let Some((node, enclosing)) = stack.pop() {
            let Some(element) = doc.get(node) else {
                continue;
            };
            let row = if profile.is_row(element) {
                slot.insert(node, order.len());
                order.push((node, Vec::new()));
                Some(node)
            } else {
                enclosing
            };
            if let Some(index) = row.and_then(|r| slot.get(&r).copied()) {
                let ids = &mut order[index].1;
                for id in element_identifiers(element) {
                    if !ids.iter().any(|known| known == id) {
                        ids.push(id.to_string());
                    }
                }
            }
            stack.extend(element.children().iter().rev().map(|&child| (child, row)));
        }

        let row_count = order.len();
        let mut rows: HashMap<String, Vec<NodeId>> = HashMap::new();
        let mut identified = HashSet::new();
        for (row, mut ids) in order {
            if ids.is_empty() {
                let text = doc.text_content(row);
                for token in TEXT_IDENTIFIER.find_iter(&text) {
                    if !ids.iter().any(|known| known == token.as_str()) {
                        ids.push(token.as_str().to_string());
                    }
                }
            }
            if !ids.is_empty() {
                identified.insert(row);
            }
            for id in ids {
                rows.entry(id).or_default().push(row);
            }
        }
        Self {
            rows,
            identified,
            row_count,
        }
    }

    /// Rows rendering `identifier`, in document order.
    pub fn rows(&self, identifier: &Identifier) -> &[NodeId] {
        self.rows
            .get(identifier.as_str())
            .map_or(&[], |rows| rows.as_slice())
    }

    /// Whether `row` carries any identifier at all.
    pub fn identifies(&self, row: NodeId) -> bool {
        self.identified.contains(&row)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

pub trait Locator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate elements rendering `identifier`. Not necessarily rows.
    fn candidates(&self, doc: &Document, profile: &SiteProfile, identifier: &Identifier) -> Vec<NodeId>;
}

/// Matches link targets and data attributes.
#[derive(Debug, Default)]
pub struct AttributeLocator;

impl AttributeLocator {
    fn matches(element: &Element, identifier: &str) -> bool {
        if let Some(href) = element.attribute("href") {
            let embedded = match identifier_from_href(href) {
                Some(found) => found == identifier,
                None => false,
            };
            if embedded || href.contains(identifier) {
                return true;
            }
        }
        DATA_ATTRIBUTES
            .iter()
            .any(|name| element.attribute(name) == Some(identifier))
    }
}

impl Locator for AttributeLocator {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn candidates(&self, doc: &Document, _profile: &SiteProfile, identifier: &Identifier) -> Vec<NodeId> {
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&n| {
                doc.get(n)
                    .is_some_and(|e| Self::matches(e, identifier.as_str()))
            })
            .collect()
    }
}

/// Rows whose serialized content mentions the identifier.
#[derive(Debug, Default)]
pub struct StructuralLocator;

impl Locator for StructuralLocator {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn candidates(&self, doc: &Document, profile: &SiteProfile, identifier: &Identifier) -> Vec<NodeId> {
        profile
            .rows(doc)
            .into_iter()
            .filter(|&row| doc.outer_html(row).contains(identifier.as_str()))
            .collect()
    }
}

pub struct LocatorChain {
    locators: Vec<Box<dyn Locator>>,
}

impl Default for LocatorChain {
    fn default() -> Self {
        Self::new(vec![Box::new(AttributeLocator), Box::new(StructuralLocator)])
    }
}

impl LocatorChain {
    pub fn new(locators: Vec<Box<dyn Locator>>) -> Self {
        Self { locators }
    }

    /// Rows rendering `identifier`, from the first locator that finds any.
    pub fn locate_rows(&self, doc: &Document, profile: &SiteProfile, identifier: &Identifier) -> Vec<NodeId> {
        for locator in &self.locators {
            let mut rows = Vec::new();
            for candidate in locator.candidates(doc, profile, identifier) {
                if let Some(row) = profile.nearest_row(doc, candidate) {
                    if !rows.contains(&row) {
                        rows.push(row);
                    }
                }
            }
            if !rows.is_empty() {
                tracing::trace!(
                    identifier = %identifier,
                    locator = locator.name(),
                    rows = rows.len(),
                    "Located rows"
                );
                return rows;
            }
        }
        Vec::new()
    }
}
