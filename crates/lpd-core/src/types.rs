//! Common data types for detected tokens.
//!
//! Contains the dedup key (`Identifier`), display colors (`ColorHex`),
//! the transient feed event and the immutable annotation fact.

use crate::category::CategoryKey;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique token/address string identifying a detected item.
///
/// Surrounding whitespace is trimmed; an empty identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Create a new identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidIdentifier("empty identifier".to_string()));
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in notifications (`first 8 chars...`).
    pub fn short(&self) -> String {
        let head: String = self.0.chars().take(8).collect();
        format!("{head}...")
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CSS hex color (`#rgb` or `#rrggbb`), normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorHex(String);

impl ColorHex {
    /// Parse a color string.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        let digits = value
            .strip_prefix('#')
            .ok_or_else(|| CoreError::InvalidColor(raw.to_string()))?;

        let valid_len = digits.len() == 3 || digits.len() == 6;
        if !valid_len || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidColor(raw.to_string()));
        }

        Ok(Self(format!("#{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ColorHex {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ColorHex> for String {
    fn from(value: ColorHex) -> Self {
        value.0
    }
}

impl fmt::Display for ColorHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `new_item` event decoded from the feed. Transient, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedEvent {
    pub identifier: Identifier,
    pub platform_label: String,
    pub display_name: Option<String>,
}

impl RawFeedEvent {
    /// Name used for notifications, falling back to `Unknown`.
    pub fn display_name_or_unknown(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown")
    }
}

/// Accepted, classified record ready for display.
///
/// Immutable once created: fields are only readable. At most one fact exists
/// per identifier (first seen wins, enforced by the dedup registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationFact {
    identifier: Identifier,
    category: CategoryKey,
    label: String,
    color: ColorHex,
    created_at: DateTime<Utc>,
}

impl AnnotationFact {
    pub fn new(identifier: Identifier, category: CategoryKey, label: String, color: ColorHex) -> Self {
        Self {
            identifier,
            category,
            label,
            color,
            created_at: Utc::now(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn category(&self) -> &CategoryKey {
        &self.category
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn color(&self) -> &ColorHex {
        &self.color
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
