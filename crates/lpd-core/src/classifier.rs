//! Platform label classification.

use crate::category::{Category, CategoryDef, CategoryKey};

/// Pure mapping from a raw platform label to a `Category`.
///
/// Matching is a case-insensitive substring test against each definition's
/// tokens, in definition order; the first hit wins. Total: any input yields a
/// category, unmatched or empty labels yield `Category::Unclassified`.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<(String, CategoryKey)>,
}

impl Classifier {
    pub fn new(defs: &[CategoryDef]) -> Self {
        let rules = defs
            .iter()
            .flat_map(|def| {
                def.match_tokens
                    .iter()
                    .map(|token| token.trim().to_lowercase())
                    .filter(|token| !token.is_empty())
                    .map(move |token| (token, def.key.clone()))
            })
            .collect();
        Self { rules }
    }

    pub fn classify(&self, raw_label: &str) -> Category {
        if raw_label.trim().is_empty() {
            return Category::Unclassified;
        }

        let lower = raw_label.to_lowercase();
        self.rules
            .iter()
            .find(|(token, _)| lower.contains(token.as_str()))
            .map(|(_, key)| Category::Launchpad(key.clone()))
            .unwrap_or(Category::Unclassified)
    }
}
