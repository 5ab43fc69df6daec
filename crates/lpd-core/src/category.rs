//! Launch-platform categories.
//!
//! Categories are configured as data (`CategoryDef`) rather than hardcoded,
//! so adding a platform is a configuration change. Each definition carries its
//! own enabled flag and color.

use crate::error::{CoreError, Result};
use crate::types::ColorHex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable key of a configured category (lowercase, e.g. `uxento`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CategoryKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CategoryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CategoryKey> for String {
    fn from(value: CategoryKey) -> Self {
        value.0
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of classifying a platform label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// A configured launch platform.
    Launchpad(CategoryKey),
    /// No configured platform matched (the "other" bucket).
    Unclassified,
}

impl Category {
    /// Key of the classified platform, `None` when unclassified.
    pub fn key(&self) -> Option<&CategoryKey> {
        match self {
            Self::Launchpad(key) => Some(key),
            Self::Unclassified => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Launchpad(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launchpad(key) => write!(f, "{key}"),
            Self::Unclassified => write!(f, "other"),
        }
    }
}

/// Configured launch platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDef {
    /// Stable key (counter bucket, persisted cache value).
    pub key: CategoryKey,
    /// Marker / notification label (e.g. `UXENTO`).
    pub label: String,
    /// Case-insensitive substrings of the platform label that select this category.
    pub match_tokens: Vec<String>,
    /// Marker color.
    pub color: ColorHex,
    /// Whether notifications and annotations are produced.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CategoryDef {
    pub fn new(key: &str, label: &str, match_tokens: &[&str], color: &str) -> Result<Self> {
        Ok(Self {
            key: CategoryKey::new(key),
            label: label.to_string(),
            match_tokens: match_tokens.iter().map(|t| t.to_string()).collect(),
            color: ColorHex::parse(color)?,
            enabled: true,
        })
    }

    /// Check that the definition can classify anything at all.
    pub fn validate(&self) -> Result<()> {
        if self.key.as_str().is_empty() {
            return Err(CoreError::InvalidConfig("category key is empty".to_string()));
        }
        if self.key.as_str() == "other" {
            return Err(CoreError::InvalidConfig(
                "category key 'other' is reserved for unclassified events".to_string(),
            ));
        }
        if self.match_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(CoreError::InvalidConfig(format!(
                "category {} has no match tokens",
                self.key
            )));
        }
        Ok(())
    }
}

/// Definition a persisted category name refers to, by key or by label.
///
/// Older logs stored the display label (`RAPIDLAUNCH`) rather than the key.
pub fn resolve_category<'a>(defs: &'a [CategoryDef], raw: &str) -> Option<&'a CategoryDef> {
    let raw = raw.trim();
    let key = CategoryKey::new(raw);
    defs.iter()
        .find(|def| def.key == key)
        .or_else(|| defs.iter().find(|def| def.label.eq_ignore_ascii_case(raw)))
}

/// Default category table: UXENTO (red) and RAPIDLAUNCH (blue).
pub fn default_categories() -> Vec<CategoryDef> {
    vec![
        CategoryDef {
            key: CategoryKey::new("uxento"),
            label: "UXENTO".to_string(),
            match_tokens: vec!["uxento".to_string()],
            color: ColorHex::parse("#ff0000").expect("static color"),
            enabled: true,
        },
        CategoryDef {
            key: CategoryKey::new("rapid"),
            label: "RAPIDLAUNCH".to_string(),
            match_tokens: vec!["rapid".to_string()],
            color: ColorHex::parse("#1e88e5").expect("static color"),
            enabled: true,
        },
    ]
}
