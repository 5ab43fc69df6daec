//! Runtime category settings.
//!
//! Match tokens are fixed at startup; enabled flags, colors and the
//! notification preference change through the control surface.

use crate::error::{RouterError, RouterResult};
use lpd_core::{Category, CategoryDef, CategoryKey, Classifier, ColorHex};
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::info;

pub struct CategorySettings {
    classifier: Classifier,
    defs: RwLock<Vec<CategoryDef>>,
    notifications_enabled: RwLock<bool>,
}

impl CategorySettings {
    pub fn new(defs: Vec<CategoryDef>, notifications_enabled: bool) -> RouterResult<Self> {
        let mut keys = HashSet::new();
        for def in &defs {
            def.validate()?;
            if !keys.insert(def.key.clone()) {
                return Err(RouterError::DuplicateCategory(def.key.to_string()));
            }
        }

        Ok(Self {
            classifier: Classifier::new(&defs),
            defs: RwLock::new(defs),
            notifications_enabled: RwLock::new(notifications_enabled),
        })
    }

    /// Current definition of the category `raw_label` falls into, if any.
    pub fn classify_def(&self, raw_label: &str) -> Option<CategoryDef> {
        match self.classifier.classify(raw_label) {
            Category::Launchpad(key) => self.lookup(&key),
            Category::Unclassified => None,
        }
    }

    /// Current definition of `key`.
    pub fn lookup(&self, key: &CategoryKey) -> Option<CategoryDef> {
        self.defs.read().iter().find(|def| &def.key == key).cloned()
    }

    /// Configured keys in definition order.
    pub fn keys(&self) -> Vec<CategoryKey> {
        self.defs.read().iter().map(|def| def.key.clone()).collect()
    }

    pub fn set_enabled(&self, key: &CategoryKey, enabled: bool) -> RouterResult<()> {
        self.update(key, |def| def.enabled = enabled)?;
        info!(category = %key, enabled, "Category filter updated");
        Ok(())
    }

    pub fn set_color(&self, key: &CategoryKey, color: ColorHex) -> RouterResult<()> {
        self.update(key, |def| def.color = color.clone())?;
        info!(category = %key, %color, "Category color updated");
        Ok(())
    }

    pub fn notifications_enabled(&self) -> bool {
        *self.notifications_enabled.read()
    }

    /// Set the notification preference, returning the previous value.
    pub fn set_notifications_enabled(&self, enabled: bool) -> bool {
        std::mem::replace(&mut *self.notifications_enabled.write(), enabled)
    }

    fn update(&self, key: &CategoryKey, apply: impl FnOnce(&mut CategoryDef)) -> RouterResult<()> {
        let mut defs = self.defs.write();
        let def = defs
            .iter_mut()
            .find(|def| &def.key == key)
            .ok_or_else(|| RouterError::UnknownCategory(key.to_string()))?;
        apply(def);
        Ok(())
    }
}
